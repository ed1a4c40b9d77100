//! Emotion classifier: weighted per-category lexicons.
//!
//! Scoring per category is `2 × keyword hits + 4 × phrase hits + 3 × booster
//! hits`. The strictly highest score wins, so ties keep the earlier-declared
//! category. Secondary emotion is the runner-up by keyword hits alone.

use serde::{Deserialize, Serialize};

use crate::lexicon::{contains_term, count_terms, normalize};

const KEYWORD_WEIGHT: u32 = 2;
const PHRASE_WEIGHT: u32 = 4;
const BOOSTER_WEIGHT: u32 = 3;
const SEVERE_SCORE: u32 = 15;
const INTENSE_SCORE: u32 = 10;
const MAX_INDICATORS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionCategory {
    Exhausted,
    Anxious,
    Sad,
    Angry,
    Ashamed,
    Confused,
    Disappointed,
    Inadequate,
    Unsettled,
}

impl EmotionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionCategory::Exhausted => "exhausted",
            EmotionCategory::Anxious => "anxious",
            EmotionCategory::Sad => "sad",
            EmotionCategory::Angry => "angry",
            EmotionCategory::Ashamed => "ashamed",
            EmotionCategory::Confused => "confused",
            EmotionCategory::Disappointed => "disappointed",
            EmotionCategory::Inadequate => "inadequate",
            EmotionCategory::Unsettled => "unsettled",
        }
    }
}

impl std::fmt::Display for EmotionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Mild,
    Moderate,
    Intense,
    Severe,
}

impl Intensity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intensity::Mild => "mild",
            Intensity::Moderate => "moderate",
            Intensity::Intense => "intense",
            Intensity::Severe => "severe",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionSignal {
    pub primary: EmotionCategory,
    pub secondary: EmotionCategory,
    pub intensity: Intensity,
    /// Up to three matched terms from the winning category.
    pub indicators: Vec<String>,
    pub score: u32,
}

struct EmotionLexicon {
    category: EmotionCategory,
    keywords: &'static [&'static str],
    phrases: &'static [&'static str],
    boosters: &'static [&'static str],
}

const LEXICONS: &[EmotionLexicon] = &[
    EmotionLexicon {
        category: EmotionCategory::Exhausted,
        keywords: &[
            "tired", "exhausted", "drained", "worn out", "weary", "fatigue", "no energy", "spent",
            "burnt out", "burned out", "depleted", "done", "finished", "can't go on",
        ],
        phrases: &[
            "so tired of", "had enough", "at my limit", "running on empty", "got nothing left",
            "barely functioning",
        ],
        boosters: &[
            "completely", "totally", "absolutely", "utterly", "so", "extremely", "incredibly",
        ],
    },
    EmotionLexicon {
        category: EmotionCategory::Anxious,
        keywords: &[
            "anxious", "worried", "nervous", "panic", "scared", "fear", "afraid", "overwhelmed",
            "dread", "restless", "uneasy", "on edge", "tense", "stressed",
        ],
        phrases: &[
            "what if", "might happen", "going to go wrong", "can't stop thinking",
            "racing thoughts", "heart racing", "can't breathe", "what's going to happen",
        ],
        boosters: &["terrified", "petrified", "paralyzed", "crippled", "consuming"],
    },
    EmotionLexicon {
        category: EmotionCategory::Sad,
        keywords: &[
            "sad", "depressed", "hopeless", "down", "empty", "lonely", "cry", "tears", "grief",
            "heartbreak", "sorrow", "melancholy", "numb", "hollow",
        ],
        phrases: &[
            "feel like crying", "can't stop crying", "don't want to get up", "nothing matters",
            "feel so alone", "miss them", "lost everything",
        ],
        boosters: &["devastated", "shattered", "broken", "destroyed", "crushed", "unbearable"],
    },
    EmotionLexicon {
        category: EmotionCategory::Angry,
        keywords: &[
            "angry", "frustrated", "annoyed", "mad", "irritated", "furious", "rage", "hate",
            "resentful", "bitter", "outraged", "livid", "pissed",
        ],
        phrases: &[
            "can't believe they", "how dare", "had enough of", "so sick of",
            "tired of dealing with", "makes my blood boil", "had it up to here",
        ],
        boosters: &[
            "absolutely furious", "beyond angry", "blind rage", "explosive", "uncontrollable",
        ],
    },
    EmotionLexicon {
        category: EmotionCategory::Ashamed,
        keywords: &[
            "ashamed", "embarrassed", "humiliated", "guilty", "regret", "mortified", "disgraced",
            "worthless", "pathetic", "stupid", "idiot", "loser",
        ],
        phrases: &[
            "shouldn't have", "can't believe i", "everyone will think", "made a fool",
            "showed my true colors", "let everyone down",
        ],
        boosters: &["deeply", "profoundly", "completely", "utterly", "totally"],
    },
    EmotionLexicon {
        category: EmotionCategory::Confused,
        keywords: &[
            "confused", "lost", "stuck", "trapped", "unsure", "uncertain", "conflicted", "torn",
            "paralyzed", "indecisive", "directionless",
        ],
        phrases: &[
            "don't know what to do", "can't figure out", "no idea", "which way to turn",
            "at a crossroads", "going in circles", "can't see a way out",
        ],
        boosters: &["completely lost", "totally confused", "utterly lost", "hopelessly"],
    },
    EmotionLexicon {
        category: EmotionCategory::Disappointed,
        keywords: &[
            "disappointed", "let down", "failed", "failure", "defeated", "crushed", "disheartened",
            "discouraged", "demoralized",
        ],
        phrases: &[
            "thought it would be", "was supposed to", "had hoped", "expected better",
            "didn't work out", "fell through", "not what i expected",
        ],
        boosters: &["deeply", "profoundly", "bitterly", "crushingly"],
    },
    EmotionLexicon {
        category: EmotionCategory::Inadequate,
        keywords: &[
            "not enough", "inadequate", "unworthy", "imposter", "fraud", "don't deserve",
            "not good enough", "don't belong", "out of my depth",
        ],
        phrases: &[
            "everyone else is", "they're all so", "i'll never be", "why can't i just",
            "should be able to", "supposed to be better",
        ],
        boosters: &["completely", "totally", "utterly", "hopelessly"],
    },
];

const MILD_WORDS: &[&str] = &["a bit", "kind of", "somewhat", "slightly", "a little", "sort of"];
const INTENSE_WORDS: &[&str] = &["so", "very", "extremely", "incredibly", "absolutely", "completely"];
const SEVERE_WORDS: &[&str] = &[
    "overwhelmingly", "unbearably", "devastatingly", "crushingly", "paralyzingly", "impossible to",
];

/// Stateless lexicon classifier. Total: unmatched text yields `unsettled`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmotionClassifier;

impl EmotionClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, text: &str) -> EmotionSignal {
        let lower = normalize(text);

        let mut primary = EmotionCategory::Unsettled;
        let mut best_score = 0u32;
        let mut indicators: Vec<String> = Vec::new();

        for lexicon in LEXICONS {
            let mut score = 0u32;
            let mut hits: Vec<String> = Vec::new();
            for keyword in lexicon.keywords {
                if contains_term(&lower, keyword) {
                    score += KEYWORD_WEIGHT;
                    hits.push((*keyword).to_string());
                }
            }
            for phrase in lexicon.phrases {
                if contains_term(&lower, phrase) {
                    score += PHRASE_WEIGHT;
                    hits.push((*phrase).to_string());
                }
            }
            score += BOOSTER_WEIGHT * count_terms(&lower, lexicon.boosters) as u32;

            if score > best_score {
                best_score = score;
                primary = lexicon.category;
                indicators = hits;
            }
        }
        indicators.truncate(MAX_INDICATORS);

        let intensity = if best_score >= SEVERE_SCORE || count_terms(&lower, SEVERE_WORDS) > 0 {
            Intensity::Severe
        } else if best_score >= INTENSE_SCORE || count_terms(&lower, INTENSE_WORDS) > 0 {
            Intensity::Intense
        } else if count_terms(&lower, MILD_WORDS) > 0 {
            Intensity::Mild
        } else {
            Intensity::Moderate
        };

        // Runner-up counts keyword hits only; phrases and boosters do not count here.
        let mut secondary = EmotionCategory::Unsettled;
        let mut second_hits = 0usize;
        for lexicon in LEXICONS {
            if lexicon.category == primary {
                continue;
            }
            let hits = count_terms(&lower, lexicon.keywords);
            if hits > second_hits {
                second_hits = hits;
                secondary = lexicon.category;
            }
        }

        EmotionSignal {
            primary,
            secondary,
            intensity,
            indicators,
            score: best_score,
        }
    }
}

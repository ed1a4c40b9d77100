//! Cognitive distortion classifier.
//!
//! Each category owns an ordered list of case-insensitive pattern rules and a
//! pool of explanation templates. The category with the most matching rules
//! wins (strictly greater, so ties keep declaration order). Category,
//! confidence and evidence are deterministic; the explanation is drawn through
//! an injected [`TemplateChooser`].

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistortionCategory {
    Catastrophizing,
    #[serde(rename = "All-or-Nothing Thinking")]
    AllOrNothing,
    #[serde(rename = "Mind Reading")]
    MindReading,
    #[serde(rename = "Fortune Telling")]
    FortuneTelling,
    #[serde(rename = "Emotional Reasoning")]
    EmotionalReasoning,
    #[serde(rename = "Should Statements")]
    ShouldStatements,
    Labeling,
    Personalization,
    #[serde(rename = "Mental Filtering")]
    MentalFiltering,
    Overgeneralization,
    Rumination,
    #[serde(rename = "Disqualifying the Positive")]
    DisqualifyingThePositive,
    #[serde(rename = "Self-Criticism")]
    SelfCriticism,
    /// No rule matched.
    #[serde(rename = "Exploring Patterns")]
    NoDistortionFound,
}

impl DistortionCategory {
    pub fn label(&self) -> &'static str {
        match self {
            DistortionCategory::Catastrophizing => "Catastrophizing",
            DistortionCategory::AllOrNothing => "All-or-Nothing Thinking",
            DistortionCategory::MindReading => "Mind Reading",
            DistortionCategory::FortuneTelling => "Fortune Telling",
            DistortionCategory::EmotionalReasoning => "Emotional Reasoning",
            DistortionCategory::ShouldStatements => "Should Statements",
            DistortionCategory::Labeling => "Labeling",
            DistortionCategory::Personalization => "Personalization",
            DistortionCategory::MentalFiltering => "Mental Filtering",
            DistortionCategory::Overgeneralization => "Overgeneralization",
            DistortionCategory::Rumination => "Rumination",
            DistortionCategory::DisqualifyingThePositive => "Disqualifying the Positive",
            DistortionCategory::SelfCriticism => "Self-Criticism",
            DistortionCategory::NoDistortionFound => "Exploring Patterns",
        }
    }

    pub fn is_found(&self) -> bool {
        *self != DistortionCategory::NoDistortionFound
    }
}

impl std::fmt::Display for DistortionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

pub const DEFAULT_EXPLANATION: &str =
    "Something in what you shared caught my attention. Let's explore what might be underneath it.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistortionSignal {
    #[serde(rename = "type")]
    pub kind: DistortionCategory,
    /// Number of this category's rules that matched.
    pub confidence: u32,
    /// Literal matched spans, one per matching rule.
    pub evidence: Vec<String>,
    pub explanation: String,
}

// ---------------------------------------------------------------------------
// Template selection seam
// ---------------------------------------------------------------------------

/// Picks an index into a template pool of `len` entries (`len > 0`).
pub trait TemplateChooser: Send + Sync {
    fn choose(&self, len: usize) -> usize;
}

/// Production chooser backed by the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomChooser;

impl TemplateChooser for RandomChooser {
    fn choose(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Reproducible chooser for tests and replays.
#[derive(Debug)]
pub struct SeededChooser {
    rng: Mutex<StdRng>,
}

impl SeededChooser {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl TemplateChooser for SeededChooser {
    fn choose(&self, len: usize) -> usize {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(0..len)
    }
}

/// Always picks the same slot (clamped to the pool).
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedChooser(pub usize);

impl TemplateChooser for FixedChooser {
    fn choose(&self, len: usize) -> usize {
        self.0.min(len.saturating_sub(1))
    }
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

struct DistortionRules {
    category: DistortionCategory,
    patterns: &'static [&'static str],
    templates: &'static [&'static str],
}

const RULES: &[DistortionRules] = &[
    DistortionRules {
        category: DistortionCategory::Catastrophizing,
        patterns: &[
            r"\b(disaster|catastrophe|nightmare|end of the world|ruined|destroyed|can't survive|won't survive|impossible to recover)\b",
            r"\b(worst thing|worst possible|terrible mistake|huge mistake|massive failure)\b",
            r"\b(everything is (ruined|destroyed|over|lost))\b",
            r"\b(can't (handle|take|bear|deal with) this)\b",
            r"\b(going to (lose|lose my|ruin my|destroy my|end my))\b",
        ],
        templates: &[
            "Your mind is jumping to the worst possible outcome, treating this situation as catastrophic when there may be other possibilities.",
            "You're amplifying the negative consequences while minimizing your ability to cope with them.",
            "The situation feels apocalyptic, but your mind may be exaggerating the true impact.",
        ],
    },
    DistortionRules {
        category: DistortionCategory::AllOrNothing,
        patterns: &[
            r"\b(always|never|every single|each and every|all or nothing|completely|totally|absolutely)\b.*\b(fail|wrong|bad|terrible|horrible)\b",
            r"\b(if i can't .* (perfectly|completely|fully) then).*\b(why bother|what's the point|useless)\b",
            r"\b(either .* or|black and white|no middle ground|complete (success|failure))\b",
            r"\b(total|complete|absolute|utter) (failure|disaster|mess|wreck)\b",
            r"\b(i'm (completely|totally|absolutely) (useless|worthless|hopeless))\b",
        ],
        templates: &[
            "You're viewing this situation in black-and-white terms, missing the gray areas and partial successes.",
            "Your thinking is polarized, either perfect or terrible, without recognizing the middle ground where most of life happens.",
            "You're discounting the nuance here. Reality rarely fits into absolute categories.",
        ],
    },
    DistortionRules {
        category: DistortionCategory::MindReading,
        patterns: &[
            r"\b(they (think|believe|assume|probably think|must think|surely think))\b",
            r"\b(everyone (thinks|knows|believes|sees))\b",
            r"\b(people (think|are thinking|probably))\b",
            r"\b(he thinks|she thinks|they're thinking)\b",
            r"\b(can tell (they|he|she) (think|thinks|is thinking))\b",
            r"\b(know what they're thinking|can see it in their eyes)\b",
        ],
        templates: &[
            "You're assuming you know what others are thinking without having direct evidence of their thoughts.",
            "Your mind is filling in the gaps about others' perspectives, but these assumptions may not reflect reality.",
            "You're projecting your fears onto others' minds. Their actual thoughts might be quite different.",
        ],
    },
    DistortionRules {
        category: DistortionCategory::FortuneTelling,
        patterns: &[
            r"\b(going to (fail|lose|mess up|screw up|ruin|be terrible|be awful|be a disaster))\b",
            r"\b(will (never|not|fail|lose|be able to))\b",
            r"\b(can already (see|tell|know) (it|this|that) (will|won't|is going to))\b",
            r"\b(destined to|doomed to|bound to fail|certain to fail)\b",
            r"\b(i just know (it|this|that))\b.*\b(will|won't|going to)\b",
            r"\b(never going to|won't ever|will never be able to)\b",
        ],
        templates: &[
            "You're predicting a negative future as if you can see it with certainty, but the future hasn't been written yet.",
            "Your mind is creating a self-fulfilling prophecy by assuming failure before you've even tried.",
            "You're treating your anxious predictions as facts rather than possibilities.",
        ],
    },
    DistortionRules {
        category: DistortionCategory::EmotionalReasoning,
        patterns: &[
            r"\b(i feel (like|as if|that) .*)\b",
            r"\b(it feels (like|as if|that) .*)\b",
            r"\b(because i feel|since i feel)\b",
            r"\b(feel so (sure|certain|convinced))\b",
            r"\b(my (gut|heart|feelings) (tells|tell) me)\b",
        ],
        templates: &[
            "You're using your feelings as evidence for what's true, but emotions are reactions, not facts.",
            "Just because something feels true doesn't make it objectively true. Feelings can be powerful but misleading.",
            "Your emotional experience is valid, but treating it as proof of reality can lead you astray.",
        ],
    },
    DistortionRules {
        category: DistortionCategory::ShouldStatements,
        patterns: &[
            r"\b(i should|you should|they should|he should|she should|we should)\b",
            r"\b(i must|you must|they must|have to|need to|ought to)\b",
            r"\b(i'm supposed to|shouldn't have|should have|must have)\b",
            r"\b(i deserve to be|don't deserve to)\b",
        ],
        templates: &[
            "You're using rigid rules about how things 'should' be, creating unnecessary pressure and guilt.",
            "These 'should' statements are like a harsh internal critic that never lets you off the hook.",
            "You're holding yourself to unrealistic standards that set you up for feeling inadequate.",
        ],
    },
    DistortionRules {
        category: DistortionCategory::Labeling,
        patterns: &[
            r"\b(i am a|i'm a|i'm such a)\s*(loser|failure|idiot|stupid|worthless|pathetic|waste|mess)\b",
            r"\b(i'm (totally|completely|absolutely) (worthless|useless|hopeless))\b",
            r"\b(that's just (who|what) i am)\b",
            r"\b(i'm (the type of|that kind of) person who)\b.*\b(fails|messes up|can't)\b",
        ],
        templates: &[
            "You're applying a harsh label to yourself instead of describing a specific behavior or situation.",
            "This label reduces your complex humanity to a single negative judgment. You're more than this.",
            "Labels stick, but they're rarely accurate. You're describing what happened, not who you are.",
        ],
    },
    DistortionRules {
        category: DistortionCategory::Personalization,
        patterns: &[
            r"\b(my fault|because of me|i caused|i'm to blame|i ruined|i messed up everything)\b",
            r"\b(this (is|was|happened) because of me)\b",
            r"\b(everything is my fault|all my fault)\b",
            r"\b(if only i (had|hadn't|did|didn't))\b",
            r"\b(i (take|accept) (full|all|complete) responsibility)\b",
        ],
        templates: &[
            "You're taking more responsibility than is warranted, blaming yourself for things outside your control.",
            "While self-reflection is valuable, you may be over-owning outcomes that have multiple causes.",
            "Your mind is assuming more blame than the situation actually warrants.",
        ],
    },
    DistortionRules {
        category: DistortionCategory::MentalFiltering,
        patterns: &[
            r"\b(but .* (bad|wrong|terrible|awful|failed))\b",
            r"\b(only .* (bad|negative|wrong))\b",
            r"\b(ignoring|dismissing|didn't notice) .* (good|positive|success)\b",
            r"\b(focus(ing)? on .* (bad|wrong|failed|negative))\b",
        ],
        templates: &[
            "You're filtering out the positive aspects of the situation and focusing exclusively on the negative.",
            "Your mind is like a spotlight that only illuminates what went wrong, leaving the rest in darkness.",
            "You're discounting evidence that doesn't fit your negative narrative.",
        ],
    },
    DistortionRules {
        category: DistortionCategory::Overgeneralization,
        patterns: &[
            r"\b(this always|it always|things always|everything always)\b",
            r"\b(this never|it never|things never|nothing ever)\b",
            r"\b(another (failure|mistake|disappointment))\b",
            r"\b( (typical|just my luck|my whole life))\b",
            r"\b(again and again|over and over|time after time)\b",
        ],
        templates: &[
            "You're taking one situation and generalizing it to a universal pattern that may not exist.",
            "Your mind is drawing broad conclusions from limited evidence.",
            "You're treating this as part of an endless pattern when it might be an isolated incident.",
        ],
    },
    DistortionRules {
        category: DistortionCategory::Rumination,
        patterns: &[
            r"\b(thinking about (the past|past events|what happened))\b",
            r"\b(keep thinking about|can't stop thinking about|replaying)\b",
            r"\b(going over and over|stuck in my head|circling back)\b",
            r"\b(resurfaced|coming back to|keeps coming up)\b",
            r"\b(over and over in my mind|on repeat|loop)\b",
            r"\b(what i (should|could) have (said|done))\b",
        ],
        templates: &[
            "Your mind is replaying past events on a loop, which can feel draining but often means there's something unresolved seeking attention.",
            "You're stuck in a thought cycle about the past. Your brain is trying to process something, even if it feels exhausting.",
            "Rumination often happens when we're trying to solve something that can't be solved by thinking alone.",
        ],
    },
    DistortionRules {
        category: DistortionCategory::DisqualifyingThePositive,
        patterns: &[
            r"\b(that doesn't count|doesn't matter|not a big deal)\b",
            r"\b(anyone could|anyone would|that was just luck)\b",
            r"\b(but that's|but it's only|just because)\b",
            r"\b(it wasn't really|doesn't really count)\b",
        ],
        templates: &[
            "You're dismissing positive experiences as if they don't count, which keeps the negative narrative intact.",
            "Your mind is explaining away anything good, refusing to let it balance the picture.",
            "When good things happen, you're finding reasons to discount them.",
        ],
    },
    DistortionRules {
        category: DistortionCategory::SelfCriticism,
        patterns: &[
            r"\b(i (was|am being|acted) (fake|phony|pretending))\b",
            r"\b(i messed up|i screwed up|i ruined)\b",
            r"\b(i'm so (stupid|dumb|idiotic|pathetic))\b",
            r"\b(being (too|so) (hard on myself|critical|judgmental))\b",
            r"\b(beating myself up|hard on myself)\b",
            r"\b(i (should|could) have (done|said|acted) (better|differently))\b",
        ],
        templates: &[
            "You're being much harsher with yourself than you would be with anyone else. The inner critic is loud right now.",
            "There's a lot of self-judgment here. Would you speak to a friend this way?",
            "Your inner critic is working overtime. It might think it's helping, but it's actually adding to your pain.",
        ],
    },
];

struct CompiledCategory {
    category: DistortionCategory,
    patterns: Vec<Regex>,
    templates: &'static [&'static str],
}

static COMPILED: Lazy<Vec<CompiledCategory>> = Lazy::new(|| {
    RULES
        .iter()
        .map(|rules| CompiledCategory {
            category: rules.category,
            patterns: rules
                .patterns
                .iter()
                .filter_map(|p| match Regex::new(&format!("(?i){}", p)) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::error!(target: "optimism::distortion", pattern = %p, error = %e, "invalid distortion pattern");
                        None
                    }
                })
                .collect(),
            templates: rules.templates,
        })
        .collect()
});

/// Explanation pool for a category (empty for the sentinel).
pub fn explanation_templates(category: DistortionCategory) -> &'static [&'static str] {
    RULES
        .iter()
        .find(|r| r.category == category)
        .map(|r| r.templates)
        .unwrap_or(&[])
}

/// Pattern-table classifier.
#[derive(Clone)]
pub struct DistortionClassifier {
    chooser: Arc<dyn TemplateChooser>,
}

impl Default for DistortionClassifier {
    fn default() -> Self {
        Self::new(Arc::new(RandomChooser))
    }
}

impl std::fmt::Debug for DistortionClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistortionClassifier").finish_non_exhaustive()
    }
}

impl DistortionClassifier {
    pub fn new(chooser: Arc<dyn TemplateChooser>) -> Self {
        Self { chooser }
    }

    pub fn analyze(&self, text: &str) -> DistortionSignal {
        let mut best: Option<(&CompiledCategory, Vec<String>)> = None;
        let mut best_count = 0usize;

        for compiled in COMPILED.iter() {
            let evidence: Vec<String> = compiled
                .patterns
                .iter()
                .filter_map(|re| re.find(text).map(|m| m.as_str().to_string()))
                .collect();
            if evidence.len() > best_count {
                best_count = evidence.len();
                best = Some((compiled, evidence));
            }
        }

        match best {
            Some((compiled, evidence)) => {
                let explanation = if compiled.templates.is_empty() {
                    DEFAULT_EXPLANATION.to_string()
                } else {
                    let idx = self.chooser.choose(compiled.templates.len());
                    compiled.templates[idx.min(compiled.templates.len() - 1)].to_string()
                };
                DistortionSignal {
                    kind: compiled.category,
                    confidence: evidence.len() as u32,
                    evidence,
                    explanation,
                }
            }
            None => DistortionSignal {
                kind: DistortionCategory::NoDistortionFound,
                confidence: 0,
                evidence: Vec::new(),
                explanation: DEFAULT_EXPLANATION.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> DistortionClassifier {
        DistortionClassifier::new(Arc::new(FixedChooser(0)))
    }

    #[test]
    fn every_pattern_compiles() {
        let compiled: usize = COMPILED.iter().map(|c| c.patterns.len()).sum();
        let declared: usize = RULES.iter().map(|r| r.patterns.len()).sum();
        assert_eq!(compiled, declared);
        assert_eq!(COMPILED.len(), 13);
    }

    #[test]
    fn no_match_returns_sentinel() {
        let s = classifier().analyze("Lunch was fine today.");
        assert_eq!(s.kind, DistortionCategory::NoDistortionFound);
        assert_eq!(s.confidence, 0);
        assert!(s.evidence.is_empty());
        assert_eq!(s.explanation, DEFAULT_EXPLANATION);
        assert!(!s.kind.is_found());
    }

    #[test]
    fn catastrophizing_with_evidence() {
        let s = classifier().analyze("This is a total DISASTER and everything is ruined");
        assert_eq!(s.kind, DistortionCategory::Catastrophizing);
        assert_eq!(s.confidence, 2);
        assert_eq!(s.evidence, vec!["DISASTER", "everything is ruined"]);
        assert_eq!(s.explanation, RULES[0].templates[0]);
    }

    #[test]
    fn ties_keep_declaration_order() {
        // One Catastrophizing rule and one Mind Reading rule.
        let s = classifier().analyze("It was a nightmare. Everyone thinks so.");
        assert_eq!(s.kind, DistortionCategory::Catastrophizing);
        assert_eq!(s.confidence, 1);
    }

    #[test]
    fn should_statements_count_rules_not_occurrences() {
        let s = classifier().analyze("I should call, I should write, I must have forgotten");
        assert_eq!(s.kind, DistortionCategory::ShouldStatements);
        // "i should" rule, "i must" rule, "must have" rule
        assert_eq!(s.confidence, 3);
    }

    #[test]
    fn category_confidence_evidence_are_deterministic() {
        let a = DistortionClassifier::default().analyze("I keep thinking about what happened, replaying it on repeat");
        let b = DistortionClassifier::default().analyze("I keep thinking about what happened, replaying it on repeat");
        assert_eq!(a.kind, DistortionCategory::Rumination);
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.evidence, b.evidence);
        assert!(explanation_templates(a.kind).contains(&a.explanation.as_str()));
    }

    #[test]
    fn seeded_chooser_is_reproducible() {
        let text = "Everyone thinks I'm weird and they probably think I'm annoying";
        let run = |seed| {
            let c = DistortionClassifier::new(Arc::new(SeededChooser::new(seed)));
            (0..5).map(|_| c.analyze(text).explanation).collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn fixed_chooser_clamps() {
        assert_eq!(FixedChooser(10).choose(3), 2);
    }

    #[test]
    fn serializes_display_labels() {
        let s = classifier().analyze("I'm such a loser");
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["type"], "Labeling");
        let none = serde_json::to_value(classifier().analyze("ok")).unwrap();
        assert_eq!(none["type"], "Exploring Patterns");
    }
}

//! Coach-facing decision support built only from the local classifiers.
//!
//! No provider is called. The output tells a human responder what to do next,
//! what to avoid, and what to expect, with a draft reply to start from.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::crisis::{CrisisGate, CrisisSeverity};
use crate::distortion::{DistortionCategory, DistortionClassifier, DistortionSignal};
use crate::emotion::{EmotionCategory, EmotionClassifier, EmotionSignal, Intensity};
use crate::error::PipelineError;
use crate::prompt::is_likely_situation_message;

pub const MIN_MESSAGE_CHARS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseApproach {
    pub action: &'static str,
    pub dont_do: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmotionalState {
    pub intensity: &'static str,
    pub guidance: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    None,
    Distress,
    Panic,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub action: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reasoning {
    pub situation_type: &'static str,
    pub patterns: Vec<String>,
    pub primary_emotion: EmotionCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopilotAnalysis {
    pub response_approach: ResponseApproach,
    pub reply_draft: String,
    pub what_to_expect: &'static str,
    pub emotional_state: EmotionalState,
    pub risk_level: RiskAssessment,
    pub reasoning: Reasoning,
}

/// Everything the copilot rules look at.
struct Signals<'a> {
    emotion: &'a EmotionSignal,
    distortion: &'a DistortionSignal,
    is_situation: bool,
    severity: CrisisSeverity,
}

impl Signals<'_> {
    fn activated(&self) -> bool {
        matches!(self.emotion.intensity, Intensity::Severe | Intensity::Intense)
    }

    fn self_judging(&self) -> bool {
        matches!(
            self.distortion.kind,
            DistortionCategory::SelfCriticism | DistortionCategory::Labeling
        )
    }

    fn ruminating(&self) -> bool {
        self.distortion.kind == DistortionCategory::Rumination
    }
}

fn response_approach(s: &Signals<'_>) -> ResponseApproach {
    let (action, dont_do) = if s.severity == CrisisSeverity::High {
        (
            "Prioritize emotional safety. Acknowledge the pain before anything else.",
            "Do NOT offer solutions, perspective, or cognitive work right now.",
        )
    } else if s.activated() {
        (
            "Start by validating their feelings. Match their emotional intensity with your presence.",
            "Do NOT give advice or try to \"fix\" anything yet. They can't absorb it.",
        )
    } else if s.self_judging() {
        (
            "Gently challenge the self-judgment. Offer a kinder interpretation.",
            "Do NOT agree with their self-assessment or stay silent about it.",
        )
    } else if s.ruminating() {
        (
            "Acknowledge the loop, then offer ONE small grounding step.",
            "Do NOT ask \"why\" questions. They'll just spiral more.",
        )
    } else if s.is_situation {
        (
            "Ask about their experience of the situation, not their thinking about it.",
            "Do NOT label their reaction as a \"distortion\". They're responding to real ambiguity.",
        )
    } else if s.distortion.confidence >= 2 {
        (
            "Offer an alternative perspective. \"What if there's another way to see this?\"",
            "Do NOT tell them they're \"wrong\". That triggers defensiveness.",
        )
    } else {
        (
            "Get curious. Ask what feels most important to them right now.",
            "Do NOT assume you know what they need before they tell you.",
        )
    };
    ResponseApproach { action, dont_do }
}

static KEY_PHRASES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)i'm (such a|a) (loser|failure|mess|burden|disappointment)",
        r"(?i)i feel (so |really )?(unloved|worthless|hopeless|drowning)",
        r"(?i)i (always|never) (fail|messed up|ruin)",
        r"(?i)(everything|this) feels? pointless",
        r"(?i)i (don't|can't) (do this anymore|handle this)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Most quotable self-judging phrase, else the first mid-length sentence.
pub fn extract_key_phrase(message: &str) -> String {
    if let Some(m) = KEY_PHRASES.iter().find_map(|re| re.find(message)) {
        return m.as_str().to_string();
    }
    message
        .split(['.', '!', '?'])
        .find(|s| (11..80).contains(&s.chars().count()))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "what you shared".to_string())
}

fn reply_draft(s: &Signals<'_>, message: &str) -> String {
    if s.severity == CrisisSeverity::High {
        return "I hear how much you're hurting right now. What you're going through sounds incredibly heavy, \
                and I want you to know I'm here. You don't have to carry this alone. Would it help to talk about \
                what's feeling most overwhelming right now?"
            .to_string();
    }
    if s.activated() {
        if s.self_judging() {
            return format!(
                "I noticed you said \"{}\", and I want to pause there. That sounds like your inner critic talking, \
                 not reality. Before we go further, I want you to know: feeling like you're drowning doesn't mean \
                 you're failing. It means you've been carrying something heavy for too long. What happened that \
                 made today feel like too much?",
                extract_key_phrase(message)
            );
        }
        if s.is_situation {
            return "The hardest part here seems to be the uncertainty, not knowing where you stand. That ambiguity \
                    is emotionally exhausting in itself. Before we try to figure anything out, I want to understand: \
                    what part of this has been weighing on you the most?"
                .to_string();
        }
        return "What you're sharing sounds genuinely overwhelming. The fact that you're reaching out shows strength, \
                even if it doesn't feel that way right now. Let's take this one piece at a time. What would help \
                most in this moment?"
            .to_string();
    }
    if s.self_judging() {
        return format!(
            "I keep coming back to \"{}\" because that's a harsh judgment, not a fact. Would you say that to a \
             friend who was going through what you're going through? Let's look at what actually happened, \
             separate from what your mind is telling you about it.",
            extract_key_phrase(message)
        );
    }
    if s.ruminating() {
        return "It sounds like your mind has been circling this for a while. That loop is exhausting, and it usually \
                means something underneath is asking for attention. What do you think this pattern is trying to \
                tell you?"
            .to_string();
    }
    if s.is_situation {
        return "What you're describing sounds like real uncertainty, not overthinking. When someone's behavior \
                doesn't add up, the mind naturally tries to make sense of it. What would help you feel more clarity \
                right now: talking through what happened, or exploring what you need?"
            .to_string();
    }
    if s.distortion.confidence >= 2 {
        return "I hear what you're saying, and I'm also wondering: is it possible this situation could mean \
                something different than it feels like right now? What would a close friend say about this same \
                situation?"
            .to_string();
    }
    "Thank you for sharing this. I want to make sure I understand. What part of this feels most important to \
     address right now?"
        .to_string()
}

fn what_to_expect(s: &Signals<'_>) -> &'static str {
    if s.activated() {
        if s.self_judging() {
            return "They're in a shame spiral. If you try to solve their problem right now, they may feel unheard \
                    or even more defective. They need to feel accepted before they can accept help.";
        }
        if s.is_situation {
            return "The distress is coming from relational uncertainty, not lack of coping skills. They're seeking \
                    emotional clarity, not advice. Solutions offered too early will likely be rejected or forgotten.";
        }
        return "High emotional activation. They may continue messaging if your response feels too brief or \
                dismissive. Quality of presence matters more than content right now.";
    }
    if s.self_judging() {
        return "They're being harder on themselves than the situation warrants. If you don't gently challenge the \
                self-judgment, they may leave the conversation feeling worse, not better.";
    }
    if s.ruminating() {
        return "They're stuck in a thought loop. Asking \"why\" questions may deepen the spiral. They need grounding \
                or a single small step, not more analysis.";
    }
    if s.is_situation {
        return "They're responding to real interpersonal ambiguity. Treating this as a \"thinking error\" may feel \
                invalidating. Focus on their experience, not their interpretation.";
    }
    if s.emotion.intensity == Intensity::Moderate {
        return "Manageable distress. They may be ready for some exploration or gentle reframing, but keep checking \
                if they feel heard first.";
    }
    "Standard supportive approach. They seem ready for dialogue. Follow their lead on depth and pacing."
}

fn emotional_guidance(emotion: &EmotionSignal) -> String {
    use EmotionCategory::*;
    use Intensity::*;
    let text = match (emotion.primary, emotion.intensity) {
        (Exhausted, Mild) => "Some fatigue. Brief responses work well.",
        (Exhausted, Moderate) => "Visibly tired. Keep it warm and concise.",
        (Exhausted, Intense) => "Significantly drained. Long responses may overwhelm.",
        (Exhausted, Severe) => "Deeply depleted. Gentle presence only. No tasks or homework.",
        (Anxious, Mild) => "Slight unease. Structure and clarity help.",
        (Anxious, Moderate) => "Notable worry. They may seek predictability or reassurance.",
        (Anxious, Intense) => "High anxiety. Thoughts likely racing. Ground before exploring.",
        (Anxious, Severe) => "Overwhelming anxiety. May struggle to retain what you say. Keep it simple.",
        (Sad, Mild) => "Some melancholy. Acknowledgment goes a long way.",
        (Sad, Moderate) => "Visible sadness. Warmth matters more than insight.",
        (Sad, Intense) => "Deep sorrow. Space for emotion before problem-solving.",
        (Sad, Severe) => "Profound grief. Prioritize emotional safety. No fixing.",
        (Angry, Mild) => "Some frustration. Validate their perspective.",
        (Angry, Moderate) => "Clear anger. They need to feel heard first.",
        (Angry, Intense) => "Strong frustration. May want action or boundaries, not processing.",
        (Angry, Severe) => "Intense anger. Don't dismiss the heat. Approach carefully.",
        (Ashamed, Mild) => "Some self-judgment. Normalize their experience.",
        (Ashamed, Moderate) => "Clear shame. Compassion over correction.",
        (Ashamed, Intense) => "Deep shame. May feel unworthy of help. Explicit acceptance needed.",
        (Ashamed, Severe) => "Shame spiral. Non-judgmental presence is everything right now.",
        (Confused, Mild) => "Slight uncertainty. Clarity and structure help.",
        (Confused, Moderate) => "Visible confusion. One step at a time.",
        (Confused, Intense) => "Very lost. Simplify. No complex exploration yet.",
        (Confused, Severe) => "Completely disoriented. Grounding before anything else.",
        (Disappointed, Mild) => "Some letdown. Acknowledge what didn't meet expectations.",
        (Disappointed, Moderate) => "Clear disappointment. Validate the gap between hope and reality.",
        (Disappointed, Intense) => "Deep disappointment. May need to grieve what didn't happen.",
        (Disappointed, Severe) => "Crushing disappointment. Emotional safety before perspective.",
        (Inadequate, Mild) => "Some self-doubt. Reinforce their worth.",
        (Inadequate, Moderate) => "Feeling not enough. Challenge the comparison.",
        (Inadequate, Intense) => "Strong inadequacy. Explicitly affirm their value.",
        (Inadequate, Severe) => "Profound unworthiness. They need to feel accepted as-is.",
        (Unsettled, intensity) => {
            return format!(
                "{} emotional state. Respond with appropriate warmth and pacing.",
                intensity.as_str()
            )
        }
    };
    text.to_string()
}

fn risk_assessment(s: &Signals<'_>) -> RiskAssessment {
    match s.severity {
        CrisisSeverity::High => RiskAssessment {
            level: RiskLevel::Panic,
            action: "Crisis indicators detected. Prioritize safety. Consider crisis resources if distress escalates.",
        },
        CrisisSeverity::Moderate => RiskAssessment {
            level: RiskLevel::Distress,
            action: "Elevated distress. Extra validation needed. Check in on their safety if appropriate.",
        },
        CrisisSeverity::Low if s.emotion.intensity == Intensity::Severe => RiskAssessment {
            level: RiskLevel::Shutdown,
            action: "High overwhelm detected. Short, gentle responses. No complex cognitive work.",
        },
        CrisisSeverity::Low => RiskAssessment {
            level: RiskLevel::None,
            action: "No crisis indicators. Standard supportive approach is appropriate.",
        },
    }
}

fn situation_type(s: &Signals<'_>) -> &'static str {
    if s.is_situation {
        "Interpersonal situation"
    } else if s.ruminating() {
        "Thought loop"
    } else if s.self_judging() {
        "Self-judgment"
    } else if s.emotion.primary == EmotionCategory::Confused {
        "Decision point"
    } else {
        "Emotional distress"
    }
}

fn intensity_label(intensity: Intensity) -> &'static str {
    match intensity {
        Intensity::Mild => "Mild",
        Intensity::Moderate => "Moderate",
        Intensity::Intense => "Intense",
        Intensity::Severe => "Severe",
    }
}

/// Stateless analyzer; holds the classifiers it runs.
#[derive(Debug, Clone, Default)]
pub struct Copilot {
    emotions: EmotionClassifier,
    distortions: DistortionClassifier,
    crisis: CrisisGate,
}

impl Copilot {
    pub fn new(distortions: DistortionClassifier) -> Self {
        Self {
            emotions: EmotionClassifier::new(),
            distortions,
            crisis: CrisisGate::new(),
        }
    }

    pub fn analyze(&self, message: &str) -> Result<CopilotAnalysis, PipelineError> {
        let message = message.trim();
        if message.chars().count() < MIN_MESSAGE_CHARS {
            return Err(PipelineError::Validation(format!(
                "Please provide a message to analyze (at least {} characters).",
                MIN_MESSAGE_CHARS
            )));
        }

        let emotion = self.emotions.analyze(message);
        let distortion = self.distortions.analyze(message);
        let verdict = self.crisis.evaluate(message);
        let signals = Signals {
            emotion: &emotion,
            distortion: &distortion,
            is_situation: is_likely_situation_message(message),
            severity: verdict.severity,
        };

        Ok(CopilotAnalysis {
            response_approach: response_approach(&signals),
            reply_draft: reply_draft(&signals, message),
            what_to_expect: what_to_expect(&signals),
            emotional_state: EmotionalState {
                intensity: intensity_label(emotion.intensity),
                guidance: emotional_guidance(&emotion),
            },
            risk_level: risk_assessment(&signals),
            reasoning: Reasoning {
                situation_type: situation_type(&signals),
                patterns: if distortion.confidence > 0 {
                    vec![distortion.kind.label().to_string()]
                } else {
                    Vec::new()
                },
                primary_emotion: emotion.primary,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distortion::FixedChooser;
    use std::sync::Arc;

    fn copilot() -> Copilot {
        Copilot::new(DistortionClassifier::new(Arc::new(FixedChooser(0))))
    }

    #[test]
    fn short_messages_are_rejected() {
        let err = copilot().analyze("  sad   ").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn high_crisis_maps_to_panic() {
        let a = copilot().analyze("I want to die, I can't go on like this").unwrap();
        assert_eq!(a.risk_level.level, RiskLevel::Panic);
        assert!(a.response_approach.action.starts_with("Prioritize emotional safety"));
        assert!(a.reply_draft.contains("You don't have to carry this alone"));
    }

    #[test]
    fn single_distress_phrase_maps_to_distress() {
        let a = copilot().analyze("Honestly I feel hopeless about work lately").unwrap();
        assert_eq!(a.risk_level.level, RiskLevel::Distress);
    }

    #[test]
    fn interpersonal_messages_are_not_pathologized() {
        let a = copilot().analyze("My partner keeps doing this thing with texts").unwrap();
        assert_eq!(a.reasoning.situation_type, "Interpersonal situation");
    }

    #[test]
    fn key_phrase_prefers_self_judgment() {
        assert_eq!(
            extract_key_phrase("Ugh. I'm such a failure at this. Whatever."),
            "I'm such a failure"
        );
        assert_eq!(
            extract_key_phrase("Ugh. Today was long. The meeting ran over again"),
            "Today was long"
        );
        assert_eq!(extract_key_phrase("ok. fine."), "what you shared");
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let a = copilot().analyze("I keep thinking about what I said at dinner").unwrap();
        let v = serde_json::to_value(&a).unwrap();
        assert!(v["responseApproach"]["dontDo"].is_string());
        assert!(v["emotionalState"]["intensity"].is_string());
        assert!(v["reasoning"]["primaryEmotion"].is_string());
    }
}

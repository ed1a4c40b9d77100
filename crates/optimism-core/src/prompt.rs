//! Two-phase prompt assembly.
//!
//! Phase 1 asks for a dry, structured analysis of the message. Phase 2 asks for
//! the user-facing reply and embeds the phase-1 analysis, so the reply has
//! concrete facts to anchor to instead of stock sympathy.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::depth::IcebergLayer;
use crate::distortion::DistortionSignal;
use crate::emotion::EmotionSignal;
use crate::guidance::{AnalysisResult, SessionHints};
use crate::provider::{ChatMessage, Role};

/// Phase-1 system instruction.
pub const ANALYSIS_SYSTEM: &str = r#"You analyze a short message someone wrote about how they feel.
Do not reply to them. Do not comfort them. Do not use empathetic language.

Extract exactly four things:
- trigger_event: the concrete thing that happened, in their words where possible
- likely_interpretation: what they are probably telling themselves it means
- underlying_fear: the fear underneath that interpretation
- emotional_need: what they most need to feel right now

If something is not stated, infer the most likely answer from the message. Keep each value to one sentence.

Return ONLY this JSON object, no markdown, nothing before or after:
{"trigger_event": "...", "likely_interpretation": "...", "underlying_fear": "...", "emotional_need": "..."}"#;

/// Stock phrases the reply must not contain.
pub const FORBIDDEN_PHRASES: &[&str] = &[
    "I hear you",
    "That sounds really hard",
    "It's completely understandable",
    "Your feelings are valid",
    "I'm sorry you're going through this",
    "It's okay to feel this way",
    "You're not alone",
    "Take a deep breath",
    "Be kind to yourself",
];

/// Phase-2 system template. Placeholders are filled by [`PromptBuilder::build_response_instruction`].
pub const RESPONSE_TEMPLATE: &str = r#"You help someone look underneath a difficult moment, one layer at a time (surface, trigger, emotion, core belief).

What is actually going on (from a prior analysis, do not repeat it back verbatim):
- Trigger event: {trigger_event}
- Their likely interpretation: {likely_interpretation}
- Underlying fear: {underlying_fear}
- Emotional need: {emotional_need}

Current depth: {layer_focus} (turn {turn})
Signals from their wording: primary feeling {primary_emotion} ({intensity}), also {secondary_emotion}.
{pattern_line}
{situation_line}
{hints_block}
Write a short, human reply:
- acknowledgment: one sentence that names the specific trigger event. No generic sympathy.
- thoughtPattern: the name of the thinking pattern, only if one is clearly present
- patternNote: one sentence on how that pattern shows up in what they wrote
- reframe: one grounded alternative reading of the trigger event
- question: exactly ONE question that moves them one layer deeper
- encouragement: optional, one sentence, specific to them
- layerInsight: one sentence about what this layer has revealed so far
- progressScore: 0-100, how close the conversation is to the core belief
- layerProgress: {"surface": 0-100, "trigger": 0-100, "emotion": 0-100, "coreBelief": 0-100}

Never use these phrases: {forbidden}.
No therapy jargon. Plain words. Each field at most two sentences.

Return ONLY the JSON object with those keys. No markdown. Nothing before or after."#;

/// Per-turn inputs to the phase-2 instruction.
#[derive(Debug, Clone, Copy)]
pub struct ResponseContext<'a> {
    pub layer: IcebergLayer,
    pub turn_count: u32,
    pub emotion: &'a EmotionSignal,
    pub distortion: &'a DistortionSignal,
    pub is_situation: bool,
    pub hints: Option<&'a SessionHints>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build_analysis_instruction(&self) -> String {
        ANALYSIS_SYSTEM.to_string()
    }

    pub fn build_response_instruction(&self, analysis: &AnalysisResult, ctx: &ResponseContext<'_>) -> String {
        let pattern_line = if ctx.distortion.kind.is_found() {
            format!(
                "Possible thinking pattern: {} (matched: {}).",
                ctx.distortion.kind.label(),
                ctx.distortion.evidence.join(", ")
            )
        } else {
            "No clear thinking pattern. Leave thoughtPattern and patternNote out rather than inventing one.".to_string()
        };
        let situation_line = if ctx.is_situation {
            "This involves another person's real behavior. Do not call their reaction a thinking error; explore their experience of it."
        } else {
            ""
        };

        RESPONSE_TEMPLATE
            .replace("{trigger_event}", &analysis.trigger_event)
            .replace("{likely_interpretation}", &analysis.likely_interpretation)
            .replace("{underlying_fear}", &analysis.underlying_fear)
            .replace("{emotional_need}", &analysis.emotional_need)
            .replace("{layer_focus}", ctx.layer.focus())
            .replace("{turn}", &ctx.turn_count.to_string())
            .replace("{primary_emotion}", ctx.emotion.primary.as_str())
            .replace("{intensity}", ctx.emotion.intensity.as_str())
            .replace("{secondary_emotion}", ctx.emotion.secondary.as_str())
            .replace("{pattern_line}", &pattern_line)
            .replace("{situation_line}", situation_line)
            .replace("{hints_block}", &hints_block(ctx.hints))
            .replace(
                "{forbidden}",
                &FORBIDDEN_PHRASES
                    .iter()
                    .map(|p| format!("\"{}\"", p))
                    .collect::<Vec<_>>()
                    .join(", "),
            )
    }

    /// System instruction, then the last `window` turns of history, then the new message.
    pub fn messages(
        &self,
        instruction: String,
        history: &[ChatMessage],
        message: &str,
        window: usize,
    ) -> Vec<ChatMessage> {
        let turns: Vec<&ChatMessage> = history.iter().filter(|m| m.role != Role::System).collect();
        let skip = turns.len().saturating_sub(window);

        let mut out = Vec::with_capacity(turns.len() - skip + 2);
        out.push(ChatMessage::system(instruction));
        out.extend(turns.into_iter().skip(skip).cloned());
        out.push(ChatMessage::user(message));
        out
    }
}

fn hints_block(hints: Option<&SessionHints>) -> String {
    let Some(h) = hints.filter(|h| !h.is_empty()) else {
        return String::new();
    };
    let mut lines = vec!["Earlier sessions with this person:".to_string()];
    if let Some(n) = h.session_count {
        lines.push(format!("- Sessions so far: {}", n));
    }
    if !h.previous_topics.is_empty() {
        lines.push(format!("- Topics: {}", h.previous_topics.join("; ")));
    }
    if !h.previous_distortions.is_empty() {
        lines.push(format!("- Patterns seen before: {}", h.previous_distortions.join("; ")));
    }
    if !h.previous_questions.is_empty() {
        lines.push(format!(
            "- Questions already asked (do not repeat them): {}",
            h.previous_questions.join(" | ")
        ));
    }
    lines.push(String::new());
    lines.join("\n")
}

static SITUATION_INDICATORS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bhe\b|\bshe\b|\bthey\b",
        r"(?i)boyfriend|girlfriend|husband|wife|partner",
        r"(?i)friend|people|someone|my (mom|dad|parent|boss|colleague)",
        r"(?i)keeps doing|changed|acting different",
        r"(?i)sometimes|not consistent|mixed signals",
        r"(?i)said to me|told me|yelled at",
        r"(?i)doesn't|won't|always|never",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Whether the message is about another person's behavior rather than a
/// purely internal thought.
pub fn is_likely_situation_message(text: &str) -> bool {
    SITUATION_INDICATORS.iter().any(|re| re.is_match(text))
}

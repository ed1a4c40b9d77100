//! Iceberg depth tracking: surface → trigger → emotion → coreBelief.
//!
//! The layer is derived from the turn count and never regresses within a
//! session. [`ConversationState`] is owned by the caller and handed back after
//! every successful round-trip; the pipeline keeps no copy.
//!
//! Turn count is `floor(history_len / 2) + 1`. Thresholds:
//!
//! | Turn | Layer |
//! |------|-------|
//! | ≤ 1 | surface |
//! | ≤ 3 | trigger |
//! | ≤ 5 | emotion |
//! | > 5 | coreBelief |

use serde::{Deserialize, Serialize};

use crate::lexicon::{contains_term, normalize};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum IcebergLayer {
    #[default]
    Surface,
    Trigger,
    Emotion,
    CoreBelief,
}

impl IcebergLayer {
    pub const ALL: [IcebergLayer; 4] = [
        IcebergLayer::Surface,
        IcebergLayer::Trigger,
        IcebergLayer::Emotion,
        IcebergLayer::CoreBelief,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IcebergLayer::Surface => "surface",
            IcebergLayer::Trigger => "trigger",
            IcebergLayer::Emotion => "emotion",
            IcebergLayer::CoreBelief => "coreBelief",
        }
    }

    /// What the guidance should aim to uncover at this depth.
    pub fn focus(&self) -> &'static str {
        match self {
            IcebergLayer::Surface => "Surface: find the concrete event",
            IcebergLayer::Trigger => "Trigger: find what set it off",
            IcebergLayer::Emotion => "Emotion: find the core feeling underneath",
            IcebergLayer::CoreBelief => "Core belief: find what this says about them",
        }
    }

    /// Canonical description used when the provider supplies no layer insight.
    pub fn default_insight(&self) -> &'static str {
        match self {
            IcebergLayer::Surface => {
                "We're starting at the surface, the thought that first caught your attention. \
                 There's almost always more beneath this first wave. Let's see what we find."
            }
            IcebergLayer::Trigger => {
                "We're exploring what activates this pattern in you. Understanding your triggers \
                 gives you choices you didn't know you had."
            }
            IcebergLayer::Emotion => {
                "We're reaching the emotional layer now, the feelings that fuel these thoughts. \
                 The goal isn't to eliminate them, but to understand what they're telling you."
            }
            IcebergLayer::CoreBelief => {
                "We've reached the core, the deep belief that may be driving these patterns. \
                 Core beliefs formed early, but they can be examined, questioned, and rewritten."
            }
        }
    }
}

impl std::fmt::Display for IcebergLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `floor(history_len / 2) + 1`
pub fn turn_count_for_history(history_len: usize) -> u32 {
    u32::try_from(history_len / 2).unwrap_or(u32::MAX - 1) + 1
}

pub fn layer_for_turn(turn_count: u32) -> IcebergLayer {
    match turn_count {
        0..=1 => IcebergLayer::Surface,
        2..=3 => IcebergLayer::Trigger,
        4..=5 => IcebergLayer::Emotion,
        _ => IcebergLayer::CoreBelief,
    }
}

/// Insight text discovered at each layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerInsights {
    #[serde(default)]
    pub surface: Option<String>,
    #[serde(default)]
    pub trigger: Option<String>,
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default)]
    pub core_belief: Option<String>,
}

impl LayerInsights {
    pub fn get(&self, layer: IcebergLayer) -> Option<&str> {
        match layer {
            IcebergLayer::Surface => self.surface.as_deref(),
            IcebergLayer::Trigger => self.trigger.as_deref(),
            IcebergLayer::Emotion => self.emotion.as_deref(),
            IcebergLayer::CoreBelief => self.core_belief.as_deref(),
        }
    }

    fn slot(&mut self, layer: IcebergLayer) -> &mut Option<String> {
        match layer {
            IcebergLayer::Surface => &mut self.surface,
            IcebergLayer::Trigger => &mut self.trigger,
            IcebergLayer::Emotion => &mut self.emotion,
            IcebergLayer::CoreBelief => &mut self.core_belief,
        }
    }
}

/// Per-session depth state, passed in and out of the pipeline each turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    #[serde(default)]
    pub turn_count: u32,
    #[serde(default)]
    pub current_layer: IcebergLayer,
    #[serde(default)]
    pub insights_by_layer: LayerInsights,
    #[serde(default)]
    pub completed: bool,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild depth from a history length when the caller has no stored state.
    pub fn from_history_len(history_len: usize) -> Self {
        let mut state = Self::new();
        state.advance(turn_count_for_history(history_len));
        state
    }

    /// Move to `turn_count` and return the resulting layer.
    ///
    /// Neither the turn count nor the layer ever moves backward.
    pub fn advance(&mut self, turn_count: u32) -> IcebergLayer {
        self.turn_count = self.turn_count.max(turn_count);
        self.current_layer = self.current_layer.max(layer_for_turn(turn_count));
        self.current_layer
    }

    /// Record provider-supplied insight for `layer`. Blank text is ignored.
    ///
    /// Returns `true` only on the call that completes the session, i.e. when
    /// the core-belief insight first becomes non-null.
    pub fn record_insight(&mut self, layer: IcebergLayer, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        *self.insights_by_layer.slot(layer) = Some(text.to_string());
        if layer == IcebergLayer::CoreBelief && !self.completed {
            self.completed = true;
            return true;
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Progress scoring
// ---------------------------------------------------------------------------

const DEPTH_TERMS: &[&str] = &[
    "feel", "feeling", "hurt", "pain", "scared", "afraid", "deep", "inside", "core", "belief",
    "always", "never", "childhood", "parents", "trauma", "wound",
];
const VULNERABILITY_TERMS: &[&str] = &[
    "ashamed", "embarrassed", "secret", "never told", "vulnerable", "hard to admit", "weakness",
    "failure",
];
const INSIGHT_TERMS: &[&str] = &[
    "realize", "understand", "see now", "makes sense", "pattern", "connection", "aha",
    "never thought of it that way",
];

const BASE_SCORE: u32 = 5;
const MAX_SCORE: u32 = 95;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerProgress {
    pub surface: u8,
    pub trigger: u8,
    pub emotion: u8,
    pub core_belief: u8,
}

impl LayerProgress {
    pub fn clamped(self) -> Self {
        Self {
            surface: self.surface.min(100),
            trigger: self.trigger.min(100),
            emotion: self.emotion.min(100),
            core_belief: self.core_belief.min(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub progress_score: u8,
    pub layer_progress: LayerProgress,
}

fn scaled(score: u32, offset: u32, factor: f32) -> u8 {
    let v = (score.saturating_sub(offset) as f32 * factor).min(100.0);
    v.round() as u8
}

/// Score how far the user has gone, from their own messages only.
///
/// Message count, depth words, vulnerability words and insight words each
/// contribute a capped bonus on top of a base of 5; the total is capped at 95.
pub fn analyze_progress<'a, I>(user_messages: I) -> ProgressReport
where
    I: IntoIterator<Item = &'a str>,
{
    let mut messages = 0u32;
    let mut depth = 0u32;
    let mut vulnerability = 0u32;
    let mut insight = 0u32;

    for msg in user_messages {
        messages += 1;
        let text = normalize(msg);
        depth += 3 * DEPTH_TERMS.iter().filter(|t| contains_term(&text, t)).count() as u32;
        vulnerability +=
            5 * VULNERABILITY_TERMS.iter().filter(|t| contains_term(&text, t)).count() as u32;
        insight += 7 * INSIGHT_TERMS.iter().filter(|t| contains_term(&text, t)).count() as u32;
    }

    let score = (BASE_SCORE
        + (messages * 3).min(15)
        + depth.min(25)
        + vulnerability.min(25)
        + insight.min(30))
    .min(MAX_SCORE);

    ProgressReport {
        progress_score: score as u8,
        layer_progress: LayerProgress {
            surface: scaled(score, 0, 1.5),
            trigger: scaled(score, 10, 1.3),
            emotion: scaled(score, 25, 1.2),
            core_belief: scaled(score, 45, 1.5),
        },
    }
}

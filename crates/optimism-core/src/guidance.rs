//! Request and reply shapes for the two generation phases.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crisis::CrisisResources;
use crate::depth::{IcebergLayer, LayerProgress};
use crate::distortion::DistortionSignal;
use crate::emotion::EmotionSignal;
use crate::error::PipelineError;

/// Optional cross-session context supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionHints {
    pub previous_topics: Vec<String>,
    pub previous_distortions: Vec<String>,
    pub previous_questions: Vec<String>,
    pub session_count: Option<u32>,
}

impl SessionHints {
    pub fn is_empty(&self) -> bool {
        self.previous_topics.is_empty()
            && self.previous_distortions.is_empty()
            && self.previous_questions.is_empty()
            && self.session_count.is_none()
    }
}

fn first_str(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match fields.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

fn first_u8(fields: &Map<String, Value>, keys: &[&str]) -> Option<u8> {
    keys.iter().find_map(|k| match fields.get(*k) {
        Some(Value::Number(n)) => n.as_f64().map(|f| f.clamp(0.0, 100.0).round() as u8),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok().map(|f| f.clamp(0.0, 100.0).round() as u8),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Phase 1
// ---------------------------------------------------------------------------

/// Hidden analysis produced before any user-facing text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub trigger_event: String,
    pub likely_interpretation: String,
    pub underlying_fear: String,
    pub emotional_need: String,
}

impl AnalysisResult {
    /// Generic tuple substituted when phase 1 cannot be parsed.
    pub fn fallback() -> Self {
        Self {
            trigger_event: "Something recent that the person is still processing".to_string(),
            likely_interpretation: "They may be reading the situation as a sign that something is wrong with them or their life".to_string(),
            underlying_fear: "Not being okay, or not being enough".to_string(),
            emotional_need: "To feel understood and less alone with this".to_string(),
        }
    }

    /// Build from parsed fields; each missing field falls back to the generic value.
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        let fallback = Self::fallback();
        Self {
            trigger_event: first_str(fields, &["trigger_event", "triggerEvent", "trigger event"])
                .unwrap_or(fallback.trigger_event),
            likely_interpretation: first_str(
                fields,
                &["likely_interpretation", "likelyInterpretation", "interpretation"],
            )
            .unwrap_or(fallback.likely_interpretation),
            underlying_fear: first_str(fields, &["underlying_fear", "underlyingFear", "fear"])
                .unwrap_or(fallback.underlying_fear),
            emotional_need: first_str(fields, &["emotional_need", "emotionalNeed", "need"])
                .unwrap_or(fallback.emotional_need),
        }
    }
}

// ---------------------------------------------------------------------------
// Phase 2
// ---------------------------------------------------------------------------

/// Local classifier output used to fill gaps in a labeled-text reply.
#[derive(Debug, Clone, Copy)]
pub struct Backfill<'a> {
    pub emotion: &'a EmotionSignal,
    pub distortion: &'a DistortionSignal,
}

impl Backfill<'_> {
    pub fn acknowledgment(&self) -> String {
        format!(
            "I hear you, and what you're sharing about feeling {} really resonates. That sounds genuinely tough.",
            self.emotion.primary
        )
    }
}

/// Canonical phase-2 reply after field-name normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuidanceReply {
    pub acknowledgment: String,
    pub distortion_type: Option<String>,
    pub distortion_explanation: Option<String>,
    pub reframe: Option<String>,
    pub probing_question: String,
    pub encouragement: Option<String>,
    pub layer_insight: Option<String>,
    pub progress_score: Option<u8>,
    pub layer_progress: Option<LayerProgress>,
}

impl GuidanceReply {
    /// Normalize parsed fields.
    ///
    /// `backfill` is applied only for replies recovered by the labeled-text
    /// parser; a reply without a probing question is rejected.
    pub fn from_fields(
        fields: &Map<String, Value>,
        backfill: Option<Backfill<'_>>,
    ) -> Result<Self, PipelineError> {
        let mut acknowledgment = first_str(fields, &["acknowledgment", "acknowledgement"]);
        let mut distortion_type = first_str(
            fields,
            &["distortionType", "thoughtPattern", "distortion_type", "thought_pattern"],
        );
        let mut distortion_explanation = first_str(
            fields,
            &["distortionExplanation", "patternNote", "distortion_explanation", "pattern_note"],
        );

        if let Some(local) = backfill {
            if acknowledgment.is_none() {
                acknowledgment = Some(local.acknowledgment());
            }
            if distortion_type.is_none() && local.distortion.kind.is_found() {
                distortion_type = Some(local.distortion.kind.label().to_string());
            }
            if distortion_explanation.is_none() && local.distortion.kind.is_found() {
                distortion_explanation = Some(local.distortion.explanation.clone());
            }
        }

        let acknowledgment = acknowledgment
            .ok_or_else(|| PipelineError::ParseFailure("reply has no acknowledgment".to_string()))?;
        let probing_question = first_str(
            fields,
            &["probingQuestion", "question", "probing_question"],
        )
        .ok_or_else(|| PipelineError::ParseFailure("reply has no probing question".to_string()))?;

        let layer_progress = fields
            .get("layerProgress")
            .or_else(|| fields.get("layer_progress"))
            .and_then(|v| match v {
                Value::Object(m) => Some(LayerProgress {
                    surface: first_u8(m, &["surface"])?,
                    trigger: first_u8(m, &["trigger"])?,
                    emotion: first_u8(m, &["emotion"])?,
                    core_belief: first_u8(m, &["coreBelief", "core_belief"])?,
                }),
                _ => None,
            });

        Ok(Self {
            acknowledgment,
            distortion_type,
            distortion_explanation,
            reframe: first_str(fields, &["reframe"]),
            probing_question,
            encouragement: first_str(fields, &["encouragement"]),
            layer_insight: first_str(fields, &["layerInsight", "layer_insight", "insight"]),
            progress_score: first_u8(fields, &["progressScore", "progress_score"]),
            layer_progress,
        })
    }
}

/// Provenance for a guidance response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub provider: String,
    pub model: String,
    pub turn: u32,
    pub strategy: String,
    pub analysis_provider: String,
}

/// Final structured guidance returned to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuidanceResponse {
    pub acknowledgment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distortion_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distortion_explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reframe: Option<String>,
    pub probing_question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encouragement: Option<String>,
    pub iceberg_layer: IcebergLayer,
    pub layer_insight: String,
    pub progress_score: u8,
    pub layer_progress: LayerProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crisis_resources: Option<CrisisResources>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<&'static str>,
    #[serde(rename = "_meta")]
    pub meta: ResponseMeta,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distortion::{DistortionCategory, DEFAULT_EXPLANATION};
    use crate::emotion::{EmotionCategory, Intensity};
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    fn signals() -> (EmotionSignal, DistortionSignal) {
        (
            EmotionSignal {
                primary: EmotionCategory::Anxious,
                secondary: EmotionCategory::Unsettled,
                intensity: Intensity::Moderate,
                indicators: vec!["worried".into()],
                score: 2,
            },
            DistortionSignal {
                kind: DistortionCategory::FortuneTelling,
                confidence: 1,
                evidence: vec!["going to fail".into()],
                explanation: "You're predicting the future.".into(),
            },
        )
    }

    #[test]
    fn analysis_fills_missing_fields() {
        let a = AnalysisResult::from_fields(&obj(json!({
            "trigger_event": "Boss cancelled the 1:1",
            "underlyingFear": "Being replaced"
        })));
        assert_eq!(a.trigger_event, "Boss cancelled the 1:1");
        assert_eq!(a.underlying_fear, "Being replaced");
        assert_eq!(a.emotional_need, AnalysisResult::fallback().emotional_need);
    }

    #[test]
    fn reply_maps_alias_field_names() {
        let r = GuidanceReply::from_fields(
            &obj(json!({
                "acknowledgment": "The cancelled 1:1 landed hard.",
                "thoughtPattern": "Fortune Telling",
                "patternNote": "Predicting the outcome.",
                "reframe": "A cancelled meeting is usually about calendars.",
                "question": "What did you expect to hear in that meeting?",
                "progressScore": 140,
                "layerProgress": {"surface": 60, "trigger": 20, "emotion": 0, "coreBelief": 0}
            })),
            None,
        )
        .unwrap();
        assert_eq!(r.distortion_type.as_deref(), Some("Fortune Telling"));
        assert_eq!(r.distortion_explanation.as_deref(), Some("Predicting the outcome."));
        assert_eq!(r.probing_question, "What did you expect to hear in that meeting?");
        assert_eq!(r.progress_score, Some(100));
        assert_eq!(r.layer_progress.unwrap().surface, 60);
    }

    #[test]
    fn missing_question_is_a_parse_failure() {
        let err = GuidanceReply::from_fields(&obj(json!({"acknowledgment": "ok"})), None).unwrap_err();
        assert!(matches!(err, PipelineError::ParseFailure(_)));
    }

    #[test]
    fn backfill_uses_local_signals() {
        let (emotion, distortion) = signals();
        let r = GuidanceReply::from_fields(
            &obj(json!({"reframe": "x", "question": "What happened next?", "encouragement": "y"})),
            Some(Backfill {
                emotion: &emotion,
                distortion: &distortion,
            }),
        )
        .unwrap();
        assert!(r.acknowledgment.contains("feeling anxious"));
        assert_eq!(r.distortion_type.as_deref(), Some("Fortune Telling"));
        assert_eq!(r.distortion_explanation.as_deref(), Some("You're predicting the future."));
    }

    #[test]
    fn sentinel_distortion_is_not_backfilled() {
        let (emotion, _) = signals();
        let none = DistortionSignal {
            kind: DistortionCategory::NoDistortionFound,
            confidence: 0,
            evidence: vec![],
            explanation: DEFAULT_EXPLANATION.into(),
        };
        let r = GuidanceReply::from_fields(
            &obj(json!({"question": "What happened?"})),
            Some(Backfill {
                emotion: &emotion,
                distortion: &none,
            }),
        )
        .unwrap();
        assert!(r.distortion_type.is_none());
    }
}

//! Pipeline scenarios against scripted providers (no network).
//!
//! Covers:
//! 1. Crisis short-circuit: no provider call, fixed safety payload
//! 2. Two-phase generation and each reply parse strategy
//! 3. Degraded phase 1, failed phase 2, and total provider outage
//! 4. Rate limiting, validation, depth monotonicity and session completion
//!
//! Run with: `cargo test -p optimism-core --test pipeline_test`

use async_trait::async_trait;
use optimism_core::prompt::ANALYSIS_SYSTEM;
use optimism_core::{
    AnalysisResult, ChatMessage, ConversationState, DistortionClassifier, FixedChooser, IcebergLayer,
    PipelineError, PipelineOutcome, PipelineRequest, Provider, ProviderCallResult, ProviderError,
    ProviderOrchestrator, RateLimitRules, RateLimiter, ReframePipeline,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const ANALYSIS_JSON: &str = r#"{
  "trigger_event": "Manager cancelled the weekly 1:1 with no reason",
  "likely_interpretation": "I'm about to be let go",
  "underlying_fear": "Being replaceable",
  "emotional_need": "Reassurance that they are valued"
}"#;

const REPLY_JSON: &str = r#"{
  "acknowledgment": "A cancelled 1:1 with no reason given leaves a lot of room for the worst story.",
  "thoughtPattern": "Fortune Telling",
  "patternNote": "You're treating one cancellation as proof of what's coming.",
  "reframe": "Managers cancel 1:1s for calendar reasons far more often than for performance ones.",
  "question": "What did you hope that 1:1 would give you this week?",
  "encouragement": "Noticing the story is already a step back from it.",
  "layerInsight": "The event is a cancelled meeting; the weight comes from what it might mean.",
  "progressScore": 22,
  "layerProgress": {"surface": 40, "trigger": 10, "emotion": 0, "coreBelief": 0}
}"#;

/// Answers phase 1 and phase 2 with separate scripts and records what it saw.
struct PhaseAware {
    name: &'static str,
    analysis: Option<String>,
    reply: Option<String>,
    calls: AtomicUsize,
    last_reply_instruction: Mutex<Option<String>>,
}

impl PhaseAware {
    fn new(name: &'static str, analysis: Option<&str>, reply: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            name,
            analysis: analysis.map(str::to_string),
            reply: reply.map(str::to_string),
            calls: AtomicUsize::new(0),
            last_reply_instruction: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_reply_instruction(&self) -> String {
        self.last_reply_instruction.lock().unwrap().clone().unwrap_or_default()
    }
}

#[async_trait]
impl Provider for PhaseAware {
    fn name(&self) -> &str {
        self.name
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<ProviderCallResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let is_analysis = messages[0].content == ANALYSIS_SYSTEM;
        if !is_analysis {
            *self.last_reply_instruction.lock().unwrap() = Some(messages[0].content.clone());
        }
        let scripted = if is_analysis { &self.analysis } else { &self.reply };
        match scripted {
            Some(content) => Ok(ProviderCallResult {
                content: content.clone(),
                provider_name: self.name.to_string(),
                model_name: "scripted-1".to_string(),
                token_usage: Some(10),
            }),
            None => Err(ProviderError::Status {
                provider: self.name.to_string(),
                code: 503,
                body: "unavailable".to_string(),
            }),
        }
    }
}

fn pipeline_with(primary: Arc<PhaseAware>, fallback: Arc<PhaseAware>) -> ReframePipeline {
    let limiter = Arc::new(RateLimiter::new(RateLimitRules::default()));
    let orchestrator = ProviderOrchestrator::new(vec![primary as Arc<dyn Provider>], fallback);
    ReframePipeline::new(limiter, orchestrator)
        .with_distortion_classifier(DistortionClassifier::new(Arc::new(FixedChooser(0))))
}

fn down() -> Arc<PhaseAware> {
    PhaseAware::new("down", None, None)
}

fn history(turns: usize) -> Vec<ChatMessage> {
    (0..turns)
        .map(|i| {
            if i % 2 == 0 {
                ChatMessage::user(format!("user turn {}", i))
            } else {
                ChatMessage::assistant(format!("assistant turn {}", i))
            }
        })
        .collect()
}

fn guidance(outcome: PipelineOutcome) -> optimism_core::GuidanceOutcome {
    match outcome {
        PipelineOutcome::Guidance(g) => *g,
        PipelineOutcome::Crisis(_) => panic!("expected guidance, got crisis payload"),
    }
}

#[tokio::test]
async fn high_crisis_short_circuits_before_any_provider() {
    let primary = PhaseAware::new("primary", Some(ANALYSIS_JSON), Some(REPLY_JSON));
    let fallback = down();
    let pipeline = pipeline_with(primary.clone(), fallback.clone());

    let outcome = pipeline
        .run("10.0.0.1", PipelineRequest::new("I want to die and I can't go on"))
        .await
        .expect("crisis is a success path");

    match outcome {
        PipelineOutcome::Crisis(payload) => {
            let v = serde_json::to_value(&payload).unwrap();
            assert_eq!(v["_isCrisisResponse"], true);
            assert!(v["crisisResources"]["india"].is_array());
        }
        PipelineOutcome::Guidance(_) => panic!("HIGH must short-circuit"),
    }
    assert_eq!(primary.calls(), 0);
    assert_eq!(fallback.calls(), 0);
}

#[tokio::test]
async fn json_reply_yields_canonical_fields_and_advances_state() {
    let primary = PhaseAware::new("primary", Some(ANALYSIS_JSON), Some(REPLY_JSON));
    let pipeline = pipeline_with(primary.clone(), down());

    let out = guidance(
        pipeline
            .run("10.0.0.2", PipelineRequest::new("My manager cancelled our 1:1 and I'm sure I'm getting fired"))
            .await
            .unwrap(),
    );

    let r = &out.response;
    assert!(r.acknowledgment.starts_with("A cancelled 1:1"));
    assert_eq!(r.probing_question, "What did you hope that 1:1 would give you this week?");
    assert_eq!(r.distortion_type.as_deref(), Some("Fortune Telling"));
    assert_eq!(r.iceberg_layer, IcebergLayer::Surface);
    assert_eq!(r.progress_score, 22);
    assert_eq!(r.layer_progress.surface, 40);
    assert!(r.crisis_resources.is_none());
    assert_eq!(r.meta.strategy, "direct_json");
    assert_eq!(r.meta.provider, "primary");
    assert_eq!(r.meta.turn, 1);

    assert_eq!(out.state.turn_count, 1);
    assert_eq!(
        out.state.insights_by_layer.surface.as_deref(),
        Some("The event is a cancelled meeting; the weight comes from what it might mean.")
    );
    assert!(!out.session_completed);
    assert_eq!(primary.calls(), 2);

    // Phase 2 instruction is built from the phase-1 analysis.
    let instruction = primary.last_reply_instruction();
    assert!(instruction.contains("Manager cancelled the weekly 1:1 with no reason"));
    assert!(instruction.contains("Being replaceable"));

    let v = serde_json::to_value(r).unwrap();
    for key in ["acknowledgment", "probingQuestion", "icebergLayer", "layerInsight", "progressScore", "_meta"] {
        assert!(v.get(key).is_some(), "missing {}", key);
    }
}

#[tokio::test]
async fn prose_wrapped_and_fenced_replies_are_recovered() {
    let wrapped = format!("Sure, here's my response:\n```json\n{}\n```\nLet me know!", REPLY_JSON);
    let primary = PhaseAware::new("primary", Some(ANALYSIS_JSON), Some(&wrapped));
    let pipeline = pipeline_with(primary, down());

    let out = guidance(pipeline.run("10.0.0.3", PipelineRequest::new("I keep replaying the meeting")).await.unwrap());
    assert_eq!(out.response.meta.strategy, "brace_span");
    assert_eq!(out.response.probing_question, "What did you hope that 1:1 would give you this week?");
}

#[tokio::test]
async fn labeled_reply_is_backfilled_from_local_signals() {
    let labeled = "**Reframe:** One cancelled meeting is thin evidence.\n\
                   **Question:** What would it mean if the cancellation had nothing to do with you?\n\
                   **Encouragement:** You caught the story early.";
    let primary = PhaseAware::new("primary", Some(ANALYSIS_JSON), Some(labeled));
    let pipeline = pipeline_with(primary, down());

    let out = guidance(
        pipeline
            .run("10.0.0.4", PipelineRequest::new("I'm so anxious, I know I'm going to fail this review"))
            .await
            .unwrap(),
    );
    let r = &out.response;
    assert_eq!(r.meta.strategy, "labeled_fields");
    assert!(r.acknowledgment.starts_with("I hear you, and what you're sharing about feeling"));
    assert_eq!(
        r.probing_question,
        "What would it mean if the cancellation had nothing to do with you?"
    );
    // No layerInsight in the reply: canonical text, nothing recorded.
    assert_eq!(r.layer_insight, IcebergLayer::Surface.default_insight());
    assert!(out.state.insights_by_layer.surface.is_none());
    // No progress in the reply: computed locally.
    assert!(r.progress_score >= 5 && r.progress_score <= 95);
}

#[tokio::test]
async fn unparseable_analysis_degrades_to_fallback() {
    let primary = PhaseAware::new("primary", Some("I'd rather not analyze that."), Some(REPLY_JSON));
    let pipeline = pipeline_with(primary.clone(), down());

    let out = guidance(pipeline.run("10.0.0.5", PipelineRequest::new("Everything feels off today")).await.unwrap());
    assert_eq!(out.response.meta.strategy, "direct_json");
    assert!(primary
        .last_reply_instruction()
        .contains(&AnalysisResult::fallback().underlying_fear));
}

#[tokio::test]
async fn unparseable_reply_is_a_parse_failure() {
    let primary = PhaseAware::new("primary", Some(ANALYSIS_JSON), Some("I'm not sure what to say here."));
    let pipeline = pipeline_with(primary, down());

    let err = pipeline
        .run("10.0.0.6", PipelineRequest::new("My friend ignored my message"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ParseFailure(_)));
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn every_provider_down_is_provider_unavailable() {
    let primary = down();
    let fallback = down();
    let pipeline = pipeline_with(primary.clone(), fallback.clone());

    let err = pipeline
        .run("10.0.0.7", PipelineRequest::new("Work has been a lot lately"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ProviderUnavailable(_)));
    assert_eq!(err.status_code(), 502);
    // Status errors are not retried.
    assert_eq!((primary.calls(), fallback.calls()), (1, 1));
}

#[tokio::test]
async fn fallback_provider_answers_when_chain_fails() {
    let fallback = PhaseAware::new("builtin", Some(ANALYSIS_JSON), Some(REPLY_JSON));
    let pipeline = pipeline_with(down(), fallback);

    let out = guidance(pipeline.run("10.0.0.8", PipelineRequest::new("I snapped at my sister")).await.unwrap());
    assert_eq!(out.response.meta.provider, "builtin");
    assert_eq!(out.response.meta.analysis_provider, "builtin");
}

#[tokio::test]
async fn moderate_crisis_attaches_resources() {
    let primary = PhaseAware::new("primary", Some(ANALYSIS_JSON), Some(REPLY_JSON));
    let pipeline = pipeline_with(primary.clone(), down());

    let out = guidance(pipeline.run("10.0.0.9", PipelineRequest::new("I feel hopeless")).await.unwrap());
    assert!(out.response.crisis_resources.is_some());
    assert!(out.response.disclaimer.is_some());
    assert_eq!(primary.calls(), 2);
}

#[tokio::test]
async fn eleventh_request_is_rate_limited() {
    let primary = down();
    let pipeline = pipeline_with(primary.clone(), down());

    // Admission runs before validation, so rejected input still counts.
    for _ in 0..10 {
        let err = pipeline.run("203.0.113.5", PipelineRequest::new("   ")).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
    match pipeline.run("203.0.113.5", PipelineRequest::new("hello")).await {
        Err(PipelineError::RateLimited { retry_after_secs, remaining }) => {
            assert!(retry_after_secs > 0);
            assert_eq!(remaining, 0);
        }
        other => panic!("expected rate limit, got {:?}", other.map(|_| ())),
    }
    assert_eq!(primary.calls(), 0);

    // Other clients are unaffected.
    let err = pipeline.run("203.0.113.6", PipelineRequest::new("")).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn depth_never_regresses_and_completion_flips_once() {
    let primary = PhaseAware::new("primary", Some(ANALYSIS_JSON), Some(REPLY_JSON));
    let pipeline = pipeline_with(primary, down());

    // 10 prior messages: turn 6, core belief.
    let out = guidance(
        pipeline
            .run(
                "10.0.1.1",
                PipelineRequest::new("I think I only matter when I'm useful").with_history(history(10)),
            )
            .await
            .unwrap(),
    );
    assert_eq!(out.response.iceberg_layer, IcebergLayer::CoreBelief);
    assert_eq!(out.response.meta.turn, 6);
    assert!(out.session_completed);
    assert!(out.state.completed);

    // Same session, caller hands back a shorter history: layer holds, no second completion.
    let again = guidance(
        pipeline
            .run(
                "10.0.1.1",
                PipelineRequest::new("Still thinking about it").with_history(history(2)).with_state(out.state.clone()),
            )
            .await
            .unwrap(),
    );
    assert_eq!(again.response.iceberg_layer, IcebergLayer::CoreBelief);
    assert_eq!(again.state.turn_count, 6);
    assert_eq!(again.response.meta.turn, 6);
    assert!(!again.session_completed);
}

#[tokio::test]
async fn layers_follow_turn_thresholds() {
    let primary = PhaseAware::new("primary", Some(ANALYSIS_JSON), Some(REPLY_JSON));
    let pipeline = pipeline_with(primary, down());

    let mut state = ConversationState::new();
    let mut seen = Vec::new();
    for history_len in [0usize, 4, 8, 10] {
        let out = guidance(
            pipeline
                .run(
                    "10.0.2.1",
                    PipelineRequest::new("Tell me more about why this keeps happening")
                        .with_history(history(history_len))
                        .with_state(state.clone()),
                )
                .await
                .unwrap(),
        );
        seen.push(out.response.iceberg_layer);
        state = out.state;
    }
    assert_eq!(
        seen,
        vec![
            IcebergLayer::Surface,
            IcebergLayer::Trigger,
            IcebergLayer::Emotion,
            IcebergLayer::CoreBelief
        ]
    );
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
}

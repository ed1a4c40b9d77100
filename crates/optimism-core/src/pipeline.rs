//! The guidance pipeline.
//!
//! Per message: rate limit → validate → crisis gate (HIGH ends here) →
//! emotion + distortion → depth → phase 1 (analysis) → phase 2 (reply) →
//! attach layer and progress.
//!
//! The pipeline holds no per-session state. The caller passes the previous
//! [`ConversationState`] in and gets the advanced copy back; nothing is
//! mutated unless the whole round-trip succeeds.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::config::OptimismConfig;
use crate::crisis::{crisis_resources, disclaimer, safety_payload, CrisisGate, SafetyPayload};
use crate::depth::{analyze_progress, turn_count_for_history, ConversationState};
use crate::distortion::DistortionClassifier;
use crate::emotion::EmotionClassifier;
use crate::error::{PipelineError, PipelineResult};
use crate::guidance::{AnalysisResult, Backfill, GuidanceReply, GuidanceResponse, ResponseMeta, SessionHints};
use crate::input::TextSample;
use crate::parse::{ParseStrategy, ReplyParserChain, ANALYSIS_SCHEMA, GUIDANCE_SCHEMA};
use crate::prompt::{is_likely_situation_message, PromptBuilder, ResponseContext};
use crate::provider::catalog::configured_provider_name;
use crate::provider::{ChatMessage, HttpProvider, Provider, ProviderOrchestrator, Role};
use crate::rate_limit::{EndpointClass, RateLimiter};

/// One inbound message with its context.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub session_hints: Option<SessionHints>,
    #[serde(default)]
    pub conversation_state: Option<ConversationState>,
}

impl PipelineRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_state(mut self, state: ConversationState) -> Self {
        self.conversation_state = Some(state);
        self
    }

    /// Decode a loosely-typed request body. A non-string or blank `message`
    /// and malformed optional fields are validation errors.
    pub fn from_json(body: &Value) -> Result<Self, PipelineError> {
        let sample = TextSample::from_json(body.get("message").unwrap_or(&Value::Null))?;
        let field = |name: &str| body.get(name).filter(|v| !v.is_null()).cloned();

        let history = match field("history") {
            Some(v) => serde_json::from_value(v)
                .map_err(|e| PipelineError::Validation(format!("Invalid history: {}", e)))?,
            None => Vec::new(),
        };
        let session_hints = field("sessionHints")
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| PipelineError::Validation(format!("Invalid sessionHints: {}", e)))?;
        let conversation_state = field("conversationState")
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| PipelineError::Validation(format!("Invalid conversationState: {}", e)))?;

        Ok(Self {
            message: sample.as_str().to_string(),
            history,
            session_hints,
            conversation_state,
        })
    }
}

/// Result of a successful guidance round-trip.
#[derive(Debug, Clone)]
pub struct GuidanceOutcome {
    pub response: GuidanceResponse,
    /// Advanced state for the caller to store and send back next turn.
    pub state: ConversationState,
    /// True when this turn recorded the core-belief insight; the caller should
    /// mark the session complete.
    pub session_completed: bool,
}

#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Guidance(Box<GuidanceOutcome>),
    Crisis(SafetyPayload),
}

pub struct ReframePipeline {
    limiter: Arc<RateLimiter>,
    crisis: CrisisGate,
    emotions: EmotionClassifier,
    distortions: DistortionClassifier,
    prompts: PromptBuilder,
    orchestrator: ProviderOrchestrator,
    parsers: ReplyParserChain,
    history_window: usize,
}

/// Providers per config: override, `<NAME>_API_KEY` chain, then the default.
pub fn orchestrator_from_config(cfg: &OptimismConfig) -> ProviderOrchestrator {
    let params = cfg.generation.params();
    let specs = cfg.provider_chain();
    let chain: Vec<Arc<dyn Provider>> = specs
        .iter()
        .map(|spec| Arc::new(HttpProvider::from_spec(spec, params)) as Arc<dyn Provider>)
        .collect();
    let fallback: Arc<dyn Provider> = Arc::new(HttpProvider::builtin(
        cfg.default_provider.base_url.clone(),
        cfg.default_provider.model.clone(),
        cfg.default_provider.api_key.clone(),
        params,
    ));
    let override_provider = cfg
        .override_provider
        .as_ref()
        .map(|o| Arc::new(HttpProvider::from_spec(&o.spec(), params)) as Arc<dyn Provider>);

    let orchestrator = ProviderOrchestrator::new(chain, fallback)
        .with_override(override_provider)
        .with_retry_policy(cfg.generation.retry_policy)
        .with_call_timeout(cfg.generation.request_timeout());
    let primary = cfg
        .override_provider
        .as_ref()
        .map(|o| o.kind.display_name())
        .unwrap_or_else(|| configured_provider_name(&specs));
    tracing::info!(
        target: "optimism::provider",
        primary,
        providers = ?orchestrator.provider_names(),
        retry = ?cfg.generation.retry_policy,
        "provider chain ready"
    );
    orchestrator
}

impl ReframePipeline {
    pub fn new(limiter: Arc<RateLimiter>, orchestrator: ProviderOrchestrator) -> Self {
        Self {
            limiter,
            crisis: CrisisGate::new(),
            emotions: EmotionClassifier::new(),
            distortions: DistortionClassifier::default(),
            prompts: PromptBuilder::new(),
            orchestrator,
            parsers: ReplyParserChain::default(),
            history_window: 6,
        }
    }

    pub fn from_config(cfg: &OptimismConfig, limiter: Arc<RateLimiter>) -> Self {
        Self::new(limiter, orchestrator_from_config(cfg)).with_history_window(cfg.generation.history_window)
    }

    pub fn with_distortion_classifier(mut self, distortions: DistortionClassifier) -> Self {
        self.distortions = distortions;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn orchestrator(&self) -> &ProviderOrchestrator {
        &self.orchestrator
    }

    pub async fn run(&self, client_id: &str, request: PipelineRequest) -> PipelineResult<PipelineOutcome> {
        let decision = self.limiter.check(client_id, EndpointClass::Reframe);
        if !decision.allowed {
            return Err(PipelineError::RateLimited {
                retry_after_secs: decision.retry_after_seconds,
                remaining: decision.remaining,
            });
        }

        let sample = TextSample::parse(&request.message)?;
        let started = Instant::now();
        tracing::info!(
            target: "optimism::pipeline",
            client = %client_id,
            chars = sample.as_str().chars().count(),
            preview = %sample.preview(),
            history = request.history.len(),
            "reframe request"
        );

        let verdict = self.crisis.evaluate(sample.as_str());
        if verdict.is_high() {
            tracing::warn!(
                target: "optimism::pipeline",
                matched = verdict.matched_phrases.len(),
                "crisis short-circuit"
            );
            return Ok(PipelineOutcome::Crisis(safety_payload()));
        }

        let emotion = self.emotions.analyze(sample.as_str());
        let distortion = self.distortions.analyze(sample.as_str());
        let is_situation = is_likely_situation_message(sample.as_str());

        let history: Vec<ChatMessage> = request
            .history
            .into_iter()
            .filter(|m| m.role != Role::System)
            .collect();
        let mut state = request
            .conversation_state
            .unwrap_or_else(|| ConversationState::from_history_len(history.len()));
        let layer = state.advance(turn_count_for_history(history.len()));
        // A caller state further along than its history keeps its turn.
        let turn = state.turn_count;

        tracing::debug!(
            target: "optimism::pipeline",
            emotion = %emotion.primary,
            intensity = emotion.intensity.as_str(),
            distortion = distortion.kind.label(),
            confidence = distortion.confidence,
            layer = layer.as_str(),
            turn,
            is_situation,
            "local signals"
        );

        // Phase 1: hidden analysis. An unparseable analysis degrades to the
        // generic tuple so phase 2 still runs.
        let analysis_messages = self.prompts.messages(
            self.prompts.build_analysis_instruction(),
            &history,
            sample.as_str(),
            self.history_window,
        );
        let analysis_call = self.orchestrator.call(&analysis_messages).await.ok_or_else(|| {
            PipelineError::ProviderUnavailable("no provider produced an analysis".to_string())
        })?;
        let analysis = match self.parsers.parse(&analysis_call.content, &ANALYSIS_SCHEMA) {
            Ok(parsed) => AnalysisResult::from_fields(&parsed.fields),
            Err(e) => {
                tracing::warn!(target: "optimism::pipeline", error = %e, "analysis unparseable, using fallback");
                AnalysisResult::fallback()
            }
        };

        // Phase 2: user-facing reply anchored to the analysis.
        let instruction = self.prompts.build_response_instruction(
            &analysis,
            &ResponseContext {
                layer,
                turn_count: turn,
                emotion: &emotion,
                distortion: &distortion,
                is_situation,
                hints: request.session_hints.as_ref(),
            },
        );
        let reply_messages =
            self.prompts
                .messages(instruction, &history, sample.as_str(), self.history_window);
        let reply_call = self.orchestrator.call(&reply_messages).await.ok_or_else(|| {
            PipelineError::ProviderUnavailable("no provider produced a reply".to_string())
        })?;
        let parsed = self.parsers.parse(&reply_call.content, &GUIDANCE_SCHEMA)?;
        let backfill = (parsed.strategy == ParseStrategy::LabeledFields).then_some(Backfill {
            emotion: &emotion,
            distortion: &distortion,
        });
        let reply = GuidanceReply::from_fields(&parsed.fields, backfill)?;

        let (layer_insight, session_completed) = match reply.layer_insight.as_deref() {
            Some(text) => (text.to_string(), state.record_insight(layer, text)),
            None => (layer.default_insight().to_string(), false),
        };

        let computed = analyze_progress(
            history
                .iter()
                .filter(|m| m.role == Role::User)
                .map(|m| m.content.as_str())
                .chain(std::iter::once(sample.as_str())),
        );
        let progress_score = reply.progress_score.unwrap_or(computed.progress_score);
        let layer_progress = reply
            .layer_progress
            .map(|p| p.clamped())
            .unwrap_or(computed.layer_progress);

        let (resources, disclaimer_text) = if verdict.needs_resources() {
            (Some(crisis_resources()), Some(disclaimer(true)))
        } else {
            (None, None)
        };

        tracing::info!(
            target: "optimism::pipeline",
            provider = %reply_call.provider_name,
            model = %reply_call.model_name,
            strategy = parsed.strategy.as_str(),
            layer = layer.as_str(),
            turn,
            completed = session_completed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reframe complete"
        );

        let response = GuidanceResponse {
            acknowledgment: reply.acknowledgment,
            distortion_type: reply.distortion_type,
            distortion_explanation: reply.distortion_explanation,
            reframe: reply.reframe,
            probing_question: reply.probing_question,
            encouragement: reply.encouragement,
            iceberg_layer: layer,
            layer_insight,
            progress_score,
            layer_progress,
            crisis_resources: resources,
            disclaimer: disclaimer_text,
            meta: ResponseMeta {
                provider: reply_call.provider_name,
                model: reply_call.model_name,
                turn,
                strategy: parsed.strategy.as_str().to_string(),
                analysis_provider: analysis_call.provider_name,
            },
        };

        Ok(PipelineOutcome::Guidance(Box::new(GuidanceOutcome {
            response,
            state,
            session_completed,
        })))
    }
}

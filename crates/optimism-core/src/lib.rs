//! optimism-core: emotional-text guidance pipeline.
//!
//! Lexical classifiers (emotion, cognitive distortion, crisis), iceberg depth
//! tracking, two-phase generation over a provider fallback chain, and the
//! layered reply parser. The HTTP surface lives in the `optimism-gateway` add-on.

pub mod config;
pub mod copilot;
pub mod crisis;
pub mod depth;
pub mod distortion;
pub mod emotion;
pub mod error;
pub mod guidance;
pub mod input;
mod lexicon;
pub mod parse;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod rate_limit;
pub mod session;

// Configuration + errors
pub use config::{DefaultProviderConfig, GenerationConfig, OptimismConfig, OverrideProviderConfig, ServerConfig};
pub use error::{ConfigError, PipelineError, PipelineResult, ProviderError, SessionError};

// Classifiers and safety
pub use crisis::{
    crisis_message, crisis_resources, disclaimer, safety_payload, CrisisGate, CrisisResources, CrisisSeverity,
    CrisisVerdict, SafetyPayload,
};
pub use distortion::{
    DistortionCategory, DistortionClassifier, DistortionSignal, FixedChooser, RandomChooser, SeededChooser,
    TemplateChooser,
};
pub use emotion::{EmotionCategory, EmotionClassifier, EmotionSignal, Intensity};
pub use input::{sanitize, validate_session_id, TextSample};

// Depth + progress
pub use depth::{
    analyze_progress, layer_for_turn, turn_count_for_history, ConversationState, IcebergLayer, LayerInsights,
    LayerProgress, ProgressReport,
};

// Generation
pub use guidance::{AnalysisResult, GuidanceReply, GuidanceResponse, ResponseMeta, SessionHints};
pub use parse::{ParseStrategy, ReplyParserChain};
pub use prompt::{is_likely_situation_message, PromptBuilder, ResponseContext};
pub use provider::{
    ChatMessage, HttpProvider, Provider, ProviderCallResult, ProviderKind, ProviderOrchestrator, ProviderSpec,
    RetryPolicy, Role,
};

// Pipeline, rate limiting, sessions, copilot
pub use copilot::{Copilot, CopilotAnalysis, RiskLevel};
pub use pipeline::{orchestrator_from_config, GuidanceOutcome, PipelineOutcome, PipelineRequest, ReframePipeline};
pub use rate_limit::{client_identifier, EndpointClass, RateLimitDecision, RateLimitRule, RateLimitRules, RateLimiter, SweeperHandle};
pub use session::{persist_turn, InMemorySessionStore, SessionRecord, SessionStore};

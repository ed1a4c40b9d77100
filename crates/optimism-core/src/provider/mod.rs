//! External text-generation providers.
//!
//! A [`Provider`] turns an ordered message list into one completion. Concrete
//! HTTP providers live in [`http`]; the catalogue of known services and the
//! environment-driven priority chain live in [`catalog`]; fallback and retry
//! live in [`orchestrator`].

pub mod catalog;
pub mod http;
pub mod orchestrator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

pub use catalog::{ProviderKind, ProviderSpec};
pub use http::{GenerationParams, HttpProvider};
pub use orchestrator::{ProviderOrchestrator, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// One successful completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCallResult {
    pub content: String,
    pub provider_name: String,
    pub model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<u32>,
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Display name used in logs and response metadata.
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Returns the raw completion. Empty content is reported as-is; the
    /// orchestrator decides what empty means.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ProviderCallResult, ProviderError>;
}

//! Ordered provider fallback with a retry on empty output.
//!
//! Order tried: the explicit override (if any), then the configured chain,
//! then the mandatory default. The first non-empty completion wins. A provider
//! that returns empty content gets one more attempt (per [`RetryPolicy`]);
//! transport, status, decode and timeout errors move straight to the next
//! provider.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{ChatMessage, Provider, ProviderCallResult};
use crate::error::ProviderError;

/// Which providers get the extra attempt after an empty reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Every provider in the chain, including the default.
    #[default]
    EveryProvider,
    /// Only the first provider attempted.
    FirstProviderOnly,
}

pub struct ProviderOrchestrator {
    override_provider: Option<Arc<dyn Provider>>,
    chain: Vec<Arc<dyn Provider>>,
    fallback: Arc<dyn Provider>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl std::fmt::Debug for ProviderOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderOrchestrator")
            .field("override", &self.override_provider.as_ref().map(|p| p.name().to_string()))
            .field("chain", &self.chain.iter().map(|p| p.name().to_string()).collect::<Vec<_>>())
            .field("fallback", &self.fallback.name())
            .field("retry", &self.retry)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl ProviderOrchestrator {
    pub fn new(chain: Vec<Arc<dyn Provider>>, fallback: Arc<dyn Provider>) -> Self {
        Self {
            override_provider: None,
            chain,
            fallback,
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_override(mut self, provider: Option<Arc<dyn Provider>>) -> Self {
        self.override_provider = provider;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Names in the order they would be tried.
    pub fn provider_names(&self) -> Vec<String> {
        self.ordered().map(|p| p.name().to_string()).collect()
    }

    fn ordered(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.override_provider
            .iter()
            .chain(self.chain.iter())
            .chain(std::iter::once(&self.fallback))
    }

    /// Try override, chain, then default. `None` when nothing produced content.
    pub async fn call(&self, messages: &[ChatMessage]) -> Option<ProviderCallResult> {
        let providers: Vec<&Arc<dyn Provider>> = self.ordered().collect();
        self.call_with(messages, &providers).await
    }

    /// Try exactly `providers`, in order.
    pub async fn call_with(
        &self,
        messages: &[ChatMessage],
        providers: &[&Arc<dyn Provider>],
    ) -> Option<ProviderCallResult> {
        for (idx, provider) in providers.iter().copied().enumerate() {
            let attempts = match self.retry {
                RetryPolicy::EveryProvider => 2,
                RetryPolicy::FirstProviderOnly if idx == 0 => 2,
                RetryPolicy::FirstProviderOnly => 1,
            };

            for attempt in 1..=attempts {
                let started = Instant::now();
                match self.attempt(Arc::as_ref(provider), messages).await {
                    Ok(result) => {
                        tracing::info!(
                            target: "optimism::provider",
                            provider = %result.provider_name,
                            model = %result.model_name,
                            attempt,
                            tokens = ?result.token_usage,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "provider succeeded"
                        );
                        return Some(result);
                    }
                    Err(e) if e.is_empty_content() && attempt < attempts => {
                        tracing::warn!(
                            target: "optimism::provider",
                            provider = provider.name(),
                            attempt,
                            "empty content, retrying same provider"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            target: "optimism::provider",
                            provider = provider.name(),
                            attempt,
                            error = %e,
                            "provider failed, trying next"
                        );
                        break;
                    }
                }
            }
        }

        tracing::error!(
            target: "optimism::provider",
            tried = providers.len(),
            "all providers failed"
        );
        None
    }

    async fn attempt(
        &self,
        provider: &dyn Provider,
        messages: &[ChatMessage],
    ) -> Result<ProviderCallResult, ProviderError> {
        let result = tokio::time::timeout(self.call_timeout, provider.complete(messages))
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: provider.name().to_string(),
                secs: self.call_timeout.as_secs(),
            })??;
        if result.content.trim().is_empty() {
            return Err(ProviderError::EmptyContent {
                provider: provider.name().to_string(),
            });
        }
        Ok(result)
    }
}

//! Error types for the guidance pipeline and its provider layer.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failures surfaced to the caller of the pipeline.
///
/// Crisis short-circuits are not errors; they are returned as a regular
/// outcome. Classifiers never fail.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64, remaining: u32 },

    #[error("No provider produced usable content: {0}")]
    ProviderUnavailable(String),

    #[error("Could not parse provider reply: {0}")]
    ParseFailure(String),
}

impl PipelineError {
    /// HTTP-style status code for the error class.
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::Validation(_) => 400,
            PipelineError::RateLimited { .. } => 429,
            PipelineError::ProviderUnavailable(_) => 502,
            PipelineError::ParseFailure(_) => 500,
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PipelineError::Validation(_))
    }
}

/// Errors from a single outbound provider call.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider} API error {code}: {body}")]
    Status {
        provider: String,
        code: u16,
        body: String,
    },

    #[error("{provider} response decode failed: {message}")]
    Decode { provider: String, message: String },

    #[error("{provider} returned empty content")]
    EmptyContent { provider: String },

    #[error("{provider} timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    #[error("{provider} is not configured: {reason}")]
    NotConfigured { provider: String, reason: String },
}

impl ProviderError {
    pub fn is_empty_content(&self) -> bool {
        matches!(self, ProviderError::EmptyContent { .. })
    }
}

/// Configuration load/validation failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config source error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failures reported by a session collaborator.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Invalid session id: {0}")]
    InvalidId(String),

    #[error("Session store error: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_class() {
        assert_eq!(PipelineError::Validation("x".into()).status_code(), 400);
        assert_eq!(
            PipelineError::RateLimited {
                retry_after_secs: 3,
                remaining: 0
            }
            .status_code(),
            429
        );
        assert_eq!(PipelineError::ProviderUnavailable("x".into()).status_code(), 502);
        assert_eq!(PipelineError::ParseFailure("x".into()).status_code(), 500);
    }

    #[test]
    fn only_validation_is_not_retryable() {
        assert!(!PipelineError::Validation("empty".into()).is_retryable());
        assert!(PipelineError::ParseFailure("bad".into()).is_retryable());
        assert!(PipelineError::ProviderUnavailable("down".into()).is_retryable());
    }
}

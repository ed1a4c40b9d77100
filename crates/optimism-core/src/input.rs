//! Inbound text validation and sanitization.
//!
//! User stories have no length limit. Sanitization only strips markup vectors
//! (script blocks, inline event handlers, `javascript:` and `data:` schemes)
//! and surrounding whitespace; the wording itself is left untouched.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{PipelineError, SessionError};

static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("script pattern"));
static EVENT_HANDLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\s*on\w+\s*=\s*["'][^"']*["']"#).expect("handler pattern"));
static JS_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)javascript\s*:").expect("javascript pattern"));
static DATA_SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)data\s*:").expect("data pattern"));
static SESSION_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("uuid pattern")
});

/// A validated user message. The text is kept as sanitized; classifiers
/// lowercase their own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSample {
    original: String,
}

impl TextSample {
    /// Validate and sanitize a raw message. Rejects input that is empty after
    /// trimming, or that becomes empty once markup vectors are removed.
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        if raw.trim().is_empty() {
            return Err(PipelineError::Validation("Input cannot be empty".to_string()));
        }
        let original = sanitize(raw);
        if original.is_empty() {
            return Err(PipelineError::Validation(
                "Input contains no readable text".to_string(),
            ));
        }
        Ok(Self { original })
    }

    /// Validate an optional JSON value: anything other than a string is rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, PipelineError> {
        match value.as_str() {
            Some(s) => Self::parse(s),
            None => Err(PipelineError::Validation("Input must be a string".to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Short preview for logs. User text is never logged in full.
    pub fn preview(&self) -> String {
        self.original.chars().take(100).collect()
    }
}

impl AsRef<str> for TextSample {
    fn as_ref(&self) -> &str {
        &self.original
    }
}

/// Trim and strip script blocks, inline event handlers and unsafe URL schemes.
pub fn sanitize(input: &str) -> String {
    let trimmed = input.trim();
    let s = SCRIPT_BLOCK.replace_all(trimmed, "");
    let s = EVENT_HANDLER.replace_all(&s, "");
    let s = JS_SCHEME.replace_all(&s, "");
    let s = DATA_SCHEME.replace_all(&s, "");
    s.trim().to_string()
}

/// Validate a session identifier (UUID shape). Returns the lower-cased id.
pub fn validate_session_id(input: &str) -> Result<String, SessionError> {
    if SESSION_ID.is_match(input) {
        Ok(input.to_lowercase())
    } else {
        Err(SessionError::InvalidId(input.to_string()))
    }
}

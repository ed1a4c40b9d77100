//! HTTP mapping for pipeline and session failures. Every error body is `{error}`.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use optimism_core::{PipelineError, SessionError};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Pipeline(PipelineError),
    Session(SessionError),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Pipeline(e)
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        ApiError::Session(e)
    }
}

/// Caller-facing text. Provider details stay in the logs.
fn public_message(e: &PipelineError) -> String {
    match e {
        PipelineError::Validation(msg) => msg.clone(),
        PipelineError::RateLimited { .. } => "Rate limit exceeded. Please slow down.".to_string(),
        PipelineError::ProviderUnavailable(_) => "AI service is not responding. Please try again.".to_string(),
        PipelineError::ParseFailure(_) => "Could not process response. Please try again.".to_string(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Pipeline(e) => {
                let status =
                    StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    tracing::error!(target: "optimism::gateway", error = %e, "request failed");
                }
                match &e {
                    PipelineError::RateLimited {
                        retry_after_secs,
                        remaining,
                    } => {
                        let body = json!({ "error": public_message(&e), "retryAfter": retry_after_secs });
                        let mut res = (status, Json(body)).into_response();
                        let headers = res.headers_mut();
                        headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
                        headers.insert("x-ratelimit-remaining", HeaderValue::from(*remaining));
                        res
                    }
                    _ => (status, Json(json!({ "error": public_message(&e) }))).into_response(),
                }
            }
            ApiError::Session(e) => {
                let (status, message) = match &e {
                    SessionError::InvalidId(_) => (StatusCode::BAD_REQUEST, e.to_string()),
                    SessionError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
                    SessionError::Store(_) => {
                        tracing::error!(target: "optimism::gateway", error = %e, "session store failed");
                        (StatusCode::INTERNAL_SERVER_ERROR, "Session store unavailable".to_string())
                    }
                };
                (status, Json(json!({ "error": message }))).into_response()
            }
        }
    }
}

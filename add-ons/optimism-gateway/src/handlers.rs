//! Route handlers.
//!
//! Bodies are read as raw bytes so malformed JSON gets the same `{error}` 400
//! as any other validation failure.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use optimism_core::provider::catalog::supported_providers;
use optimism_core::{
    client_identifier, persist_turn, ConversationState, EndpointClass, GuidanceResponse, PipelineError,
    PipelineOutcome, PipelineRequest, TextSample,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::AppState;

fn client_id(headers: &HeaderMap) -> String {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    client_identifier(header("x-forwarded-for"), header("x-real-ip"))
}

fn admit(state: &AppState, client: &str, class: EndpointClass) -> Result<(), ApiError> {
    let decision = state.limiter.check(client, class);
    if decision.allowed {
        return Ok(());
    }
    tracing::warn!(
        target: "optimism::gateway",
        client = %client,
        class = class.as_str(),
        retry_after = decision.retry_after_seconds,
        "rate limited"
    );
    Err(PipelineError::RateLimited {
        retry_after_secs: decision.retry_after_seconds,
        remaining: decision.remaining,
    }
    .into())
}

fn json_body(bytes: &Bytes) -> Result<Value, PipelineError> {
    serde_json::from_slice(bytes).map_err(|e| PipelineError::Validation(format!("Invalid JSON body: {}", e)))
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/v1/providers: the active try order and every provider the
/// catalogue can enable via `<NAME>_API_KEY`.
pub async fn providers(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    admit(&state, &client_id(&headers), EndpointClass::Default)?;
    Ok(Json(json!({
        "active": state.pipeline.orchestrator().provider_names(),
        "retryPolicy": state.pipeline.orchestrator().retry_policy(),
        "supported": supported_providers(),
    })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReframeBody<'a> {
    #[serde(flatten)]
    response: &'a GuidanceResponse,
    conversation_state: &'a ConversationState,
    session_completed: bool,
}

/// POST /api/v1/reframe
///
/// The pipeline applies the `reframe` rate class itself. Bodies that fail to
/// decode never reach it, so they are charged here.
pub async fn reframe(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response, ApiError> {
    let client = client_id(&headers);
    let request = match json_body(&body).and_then(|v| PipelineRequest::from_json(&v)) {
        Ok(request) => request,
        Err(e) => {
            admit(&state, &client, EndpointClass::Reframe)?;
            return Err(e.into());
        }
    };

    match state.pipeline.run(&client, request).await? {
        PipelineOutcome::Crisis(payload) => Ok(Json(payload).into_response()),
        PipelineOutcome::Guidance(outcome) => Ok(Json(ReframeBody {
            response: &outcome.response,
            conversation_state: &outcome.state,
            session_completed: outcome.session_completed,
        })
        .into_response()),
    }
}

/// POST /api/v1/copilot
pub async fn copilot(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<Value>, ApiError> {
    admit(&state, &client_id(&headers), EndpointClass::Default)?;
    let body = json_body(&body)?;
    let message = body.get("message").and_then(Value::as_str).unwrap_or_default();
    let analysis = state.copilot.analyze(message)?;
    Ok(Json(json!({ "analysis": analysis })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    first_message: String,
}

/// POST /api/v1/sessions
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    admit(&state, &client_id(&headers), EndpointClass::Session)?;
    let request: CreateSessionRequest = serde_json::from_slice(&body)
        .map_err(|e| PipelineError::Validation(format!("Invalid session request: {}", e)))?;
    let first = TextSample::parse(&request.first_message)?;
    let session_id = state.sessions.create_session(first.as_str()).await?;
    tracing::info!(target: "optimism::gateway", session = %session_id, "session created");
    Ok((StatusCode::CREATED, Json(json!({ "sessionId": session_id }))).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TurnRequest {
    user_message: String,
    assistant_message: String,
    #[serde(default)]
    conversation_state: ConversationState,
    /// `sessionCompleted` from the reframe response for this turn.
    #[serde(default)]
    session_completed: bool,
}

/// POST /api/v1/sessions/:id/turns
pub async fn append_turn(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    admit(&state, &client_id(&headers), EndpointClass::Messages)?;
    let turn: TurnRequest = serde_json::from_slice(&body)
        .map_err(|e| PipelineError::Validation(format!("Invalid turn: {}", e)))?;
    let user = TextSample::parse(&turn.user_message)?;
    let completed = persist_turn(
        state.sessions.as_ref(),
        &session_id,
        user.as_str(),
        &turn.assistant_message,
        &turn.conversation_state,
        turn.session_completed,
    )
    .await?;
    Ok(Json(json!({ "ok": true, "completed": completed })))
}

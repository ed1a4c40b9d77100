//! Optimism Gateway: HTTP surface for the guidance pipeline.
//!
//! Startup order: `.env`, logging, `OptimismConfig`, provider chain, rate-limit
//! sweeper, listener. Ctrl+C drains the server and stops the sweeper.

mod error;
mod handlers;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use optimism_core::{Copilot, InMemorySessionStore, OptimismConfig, RateLimiter, ReframePipeline, SessionStore};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ReframePipeline>,
    pub copilot: Arc<Copilot>,
    pub sessions: Arc<dyn SessionStore>,
    /// Shared with the pipeline so every endpoint class draws from one table.
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    fn from_config(config: &OptimismConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));
        Self {
            pipeline: Arc::new(ReframePipeline::from_config(config, Arc::clone(&limiter))),
            copilot: Arc::new(Copilot::default()),
            sessions: Arc::new(InMemorySessionStore::new()),
            limiter,
        }
    }
}

fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/reframe", post(handlers::reframe))
        .route("/api/v1/copilot", post(handlers::copilot))
        .route("/api/v1/providers", get(handlers::providers))
        .route("/api/v1/sessions", post(handlers::create_session))
        .route("/api/v1/sessions/:id/turns", post(handlers::append_turn))
        .with_state(state)
        .layer(cors)
}

#[tokio::main]
async fn main() {
    // Before the subscriber, so RUST_LOG may come from .env.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match dotenv {
        Ok(path) => tracing::debug!(target: "optimism::gateway", path = %path.display(), ".env loaded"),
        Err(e) => tracing::warn!(target: "optimism::gateway", error = %e, ".env not loaded, using system environment"),
    }

    let config = match OptimismConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(target: "optimism::gateway", error = %e, "configuration rejected");
            std::process::exit(1);
        }
    };

    let state = AppState::from_config(&config);
    let sweeper = state.limiter.spawn_sweeper(config.generation.sweep_interval());

    let addr = config.server.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(target: "optimism::gateway", addr = %addr, error = %e, "bind failed");
            sweeper.stop().await;
            std::process::exit(1);
        }
    };
    tracing::info!(target: "optimism::gateway", addr = %addr, "optimism gateway listening");

    let server = axum::serve(listener, build_app(state)).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!(target: "optimism::gateway", "shutdown requested (Ctrl+C)");
    });
    if let Err(e) = server.await {
        tracing::error!(target: "optimism::gateway", error = %e, "server error");
    }

    sweeper.stop().await;
    tracing::info!(target: "optimism::gateway", "graceful shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use optimism_core::prompt::ANALYSIS_SYSTEM;
    use optimism_core::{
        ChatMessage, DistortionClassifier, FixedChooser, Provider, ProviderCallResult, ProviderError,
        ProviderOrchestrator, RateLimitRules,
    };
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    const ANALYSIS: &str = r#"{"trigger_event":"Friend left the message on read","likely_interpretation":"They are angry with me","underlying_fear":"Being dropped","emotional_need":"Reassurance"}"#;
    const REPLY: &str = r#"{"acknowledgment":"Being left on read by someone close stings.","question":"What did you hope they'd say back?","encouragement":"You noticed the worry instead of acting on it.","layerInsight":"A read receipt became a verdict on the friendship."}"#;

    struct Canned {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Provider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        fn model(&self) -> &str {
            "canned-1"
        }

        async fn complete(&self, messages: &[ChatMessage]) -> Result<ProviderCallResult, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.reply.ok_or_else(|| ProviderError::Transport {
                provider: "canned".into(),
                message: "connection refused".into(),
            })?;
            let content = if messages[0].content == ANALYSIS_SYSTEM { ANALYSIS } else { reply };
            Ok(ProviderCallResult {
                content: content.to_string(),
                provider_name: "canned".into(),
                model_name: "canned-1".into(),
                token_usage: None,
            })
        }
    }

    fn test_state(reply: Option<&'static str>) -> (AppState, Arc<Canned>) {
        let provider = Arc::new(Canned {
            reply,
            calls: AtomicUsize::new(0),
        });
        let limiter = Arc::new(RateLimiter::new(RateLimitRules::default()));
        let orchestrator = ProviderOrchestrator::new(Vec::new(), provider.clone());
        let pipeline = ReframePipeline::new(Arc::clone(&limiter), orchestrator)
            .with_distortion_classifier(DistortionClassifier::new(Arc::new(FixedChooser(0))));
        let state = AppState {
            pipeline: Arc::new(pipeline),
            copilot: Arc::new(Copilot::default()),
            sessions: Arc::new(InMemorySessionStore::new()),
            limiter,
        };
        (state, provider)
    }

    async fn post(app: &Router, uri: &str, body: Value, ip: &str) -> (StatusCode, axum::http::HeaderMap, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(body.to_string()))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, json)
    }

    #[tokio::test]
    async fn health_reports_version() {
        let (state, _) = test_state(Some(REPLY));
        let app = build_app(state);
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn providers_lists_try_order_and_catalogue() {
        let (state, _) = test_state(Some(REPLY));
        let app = build_app(state);
        let req = Request::builder().uri("/api/v1/providers").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["active"], json!(["canned"]));
        assert_eq!(json["retryPolicy"], "every_provider");
        assert_eq!(json["supported"].as_array().unwrap().len(), 9);
        assert_eq!(json["supported"][0]["envKey"], "MISTRAL_API_KEY");
    }

    #[tokio::test]
    async fn reframe_returns_guidance_and_state() {
        let (state, provider) = test_state(Some(REPLY));
        let app = build_app(state);
        let (status, _, json) = post(
            &app,
            "/api/v1/reframe",
            json!({"message": "My friend left my message on read and now I think she's angry"}),
            "198.51.100.1",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["acknowledgment"], "Being left on read by someone close stings.");
        assert_eq!(json["probingQuestion"], "What did you hope they'd say back?");
        assert_eq!(json["icebergLayer"], "surface");
        assert_eq!(json["layerInsight"], "A read receipt became a verdict on the friendship.");
        assert_eq!(json["conversationState"]["turnCount"], 1);
        assert_eq!(json["sessionCompleted"], false);
        assert_eq!(json["_meta"]["provider"], "canned");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reframe_crisis_returns_safety_payload() {
        let (state, provider) = test_state(Some(REPLY));
        let app = build_app(state);
        let (status, _, json) = post(&app, "/api/v1/reframe", json!({"message": "I want to kill myself"}), "198.51.100.2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["_isCrisisResponse"], true);
        assert!(json["crisisResources"]["global"].is_array());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reframe_maps_errors_to_status_codes() {
        let (state, _) = test_state(Some(REPLY));
        let app = build_app(state);

        let (status, _, json) = post(&app, "/api/v1/reframe", json!({"message": "  "}), "198.51.100.3").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());

        let (status, _, _) = post(&app, "/api/v1/reframe", json!({"message": 42}), "198.51.100.3").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (down, _) = test_state(None);
        let app = build_app(down);
        let (status, _, json) =
            post(&app, "/api/v1/reframe", json!({"message": "Work has been heavy lately"}), "198.51.100.3").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"], "AI service is not responding. Please try again.");
    }

    #[tokio::test]
    async fn reframe_rate_limit_sets_headers() {
        let (state, _) = test_state(Some(REPLY));
        let app = build_app(state);
        for _ in 0..10 {
            let (status, _, _) = post(&app, "/api/v1/reframe", json!({"message": ""}), "203.0.113.9").await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        let (status, headers, json) =
            post(&app, "/api/v1/reframe", json!({"message": "hello again"}), "203.0.113.9").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(headers["retry-after"], "300");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
        assert_eq!(json["retryAfter"], 300);

        // A different first hop is a different client.
        let (status, _, _) =
            post(&app, "/api/v1/reframe", json!({"message": "hello"}), "203.0.113.10, 203.0.113.9").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn copilot_requires_ten_characters() {
        let (state, _) = test_state(Some(REPLY));
        let app = build_app(state);

        let (status, _, _) = post(&app, "/api/v1/copilot", json!({"message": "ugh"}), "198.51.100.4").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, json) = post(
            &app,
            "/api/v1/copilot",
            json!({"message": "I'm panicking, I can't breathe and everything is falling apart"}),
            "198.51.100.4",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["analysis"]["replyDraft"].is_string());
        assert!(json["analysis"]["riskLevel"].is_object());
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let (state, _) = test_state(Some(REPLY));
        let app = build_app(state);

        let (status, _, json) =
            post(&app, "/api/v1/sessions", json!({"firstMessage": "Rough week at work"}), "198.51.100.5").await;
        assert_eq!(status, StatusCode::CREATED);
        let id = json["sessionId"].as_str().unwrap().to_string();

        let (status, _, json) = post(
            &app,
            &format!("/api/v1/sessions/{}/turns", id),
            json!({
                "userMessage": "Rough week at work",
                "assistantMessage": "What made it rough?",
                "conversationState": {"turnCount": 1, "currentLayer": "surface"}
            }),
            "198.51.100.5",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({"ok": true, "completed": false}));

        let (status, _, _) = post(
            &app,
            "/api/v1/sessions/not-a-uuid/turns",
            json!({"userMessage": "x", "assistantMessage": "y"}),
            "198.51.100.5",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = post(
            &app,
            "/api/v1/sessions/00000000-0000-4000-8000-000000000000/turns",
            json!({"userMessage": "x", "assistantMessage": "y"}),
            "198.51.100.5",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

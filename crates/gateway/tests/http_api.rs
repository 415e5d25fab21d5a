//! HTTP surface: routing, bearer-token auth and inbound validation.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use sha2::{Digest, Sha256};
use tower::ServiceExt;

use cr_domain::config::Config;
use cr_gateway::api;
use cr_gateway::bootstrap;
use cr_gateway::handlers::HandlerRegistry;
use cr_gateway::state::AppState;
use cr_gateway::transport::MemoryTransport;

fn app(token: Option<&str>) -> (Router, AppState, Arc<MemoryTransport>) {
    let transport = Arc::new(MemoryTransport::new());
    let mut state = bootstrap::build_app_state(
        Arc::new(Config::default()),
        transport.clone(),
        HandlerRegistry::new(),
        None,
    )
    .unwrap();
    state.api_token_hash = token.map(|t| Sha256::digest(t.as_bytes()).to_vec());
    let router = api::router(state.clone()).with_state(state.clone());
    (router, state, transport)
}

fn inbound(body: serde_json::Value, token: Option<&str>) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri("/v1/inbound")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    req.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public_and_reports_load() {
    let (router, _state, _) = app(Some("s3cret"));
    let resp = router
        .oneshot(Request::get("/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["queue_depth"], 0);
    assert_eq!(
        body["admission_available"],
        Config::default().dispatch.admission_limit
    );
    assert!(body["backends"].is_array());
}

#[tokio::test]
async fn inbound_requires_the_token_when_configured() {
    let (router, _state, transport) = app(Some("s3cret"));
    let body = serde_json::json!({ "session_id": "s", "chat_id": "c", "text": "hi" });

    let denied = router
        .clone()
        .oneshot(inbound(body.clone(), Some("wrong")))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    assert!(transport.messages().is_empty());

    let accepted = router.oneshot(inbound(body, Some("s3cret"))).await.unwrap();
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(accepted).await["status"], "accepted");
}

#[tokio::test]
async fn inbound_action_is_applied() {
    let (router, state, transport) = app(None);
    let body = serde_json::json!({
        "session_id": "s", "chat_id": "c", "action": "set_mode:reasoning"
    });

    let resp = router.oneshot(inbound(body, None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(state.sessions.mode("s"), cr_domain::mode::Mode::Reasoning);
    assert_eq!(transport.messages().len(), 1);
}

#[tokio::test]
async fn inbound_with_two_payloads_is_a_bad_request() {
    let (router, _state, _) = app(None);
    let body = serde_json::json!({
        "session_id": "s", "chat_id": "c", "text": "hi", "voice_base64": "AAEC"
    });

    let resp = router.oneshot(inbound(body, None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(resp).await["error"]
        .as_str()
        .unwrap()
        .contains("exactly one"));
}

#[tokio::test]
async fn inbound_after_shutdown_is_refused() {
    let (router, state, _) = app(None);
    state.queue.close();
    let body = serde_json::json!({ "session_id": "s", "chat_id": "c", "text": "hi" });

    let resp = router.oneshot(inbound(body, None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

//! HTTP behaviour of the Mines API, driven through the router in-process

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use mines_casino::{
    api::{create_app, ApiKeyAuthenticator, AppState},
    config::{GameConfig, ServerConfig},
    games::FixedMinePlacer,
    metrics::CasinoMetrics,
    LedgerConfig, MemoryStore, MinesService, UserId,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const ALICE: &str = "alice-key";
const BOB: &str = "bob-key";

fn app() -> Router {
    let service = MinesService::new(
        Arc::new(MemoryStore::new()),
        Arc::new(FixedMinePlacer::new(vec![0, 1, 2]).unwrap()),
        GameConfig::default(),
        LedgerConfig::default(),
        CasinoMetrics::new().unwrap(),
    )
    .unwrap();
    let auth = ApiKeyAuthenticator::default()
        .with_key(UserId::new("alice"), ALICE)
        .with_key(UserId::new("bob"), BOB);
    let state = Arc::new(AppState::new(Arc::new(service), Arc::new(auth)));
    create_app(state, &ServerConfig::default())
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    key: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", key));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_is_public() {
    let app = app();
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_missing_credentials_rejected() {
    let app = app();
    let request = Request::get("/api/me")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["request_id"], "req-42");
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = call(&app, Method::POST, "/api/mines/rounds", Some("wrong"), Some(json!({"bet": 10, "mines": 3}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_round_over_http() {
    let app = app();

    let (status, round) = call(&app, Method::POST, "/api/mines/rounds", Some(ALICE), Some(json!({"bet": 10, "mines": 3}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(round["status"], "playing");
    let id = round["round_id"].as_str().unwrap().to_string();
    assert!(round["cells"].as_array().unwrap().iter().all(|c| c == "hidden"));

    let (status, snap) = call(&app, Method::POST, &format!("/api/mines/rounds/{}/reveal", id), Some(ALICE), Some(json!({"index": 7}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snap["current_prize"], 11);
    assert_eq!(snap["cells"][7], "gem");

    let (_, active) = call(&app, Method::GET, "/api/mines/rounds", Some(ALICE), None).await;
    assert_eq!(active["rounds"].as_array().unwrap().len(), 1);

    let (status, done) = call(&app, Method::POST, &format!("/api/mines/rounds/{}/cashout", id), Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "cashed_out");

    let (_, me) = call(&app, Method::GET, "/api/me", Some(ALICE), None).await;
    assert_eq!(me["balance"], 101);
    assert_eq!(me["games_played"], 1);

    let (_, history) = call(&app, Method::GET, "/api/mines/history?limit=5", Some(ALICE), None).await;
    assert_eq!(history["rounds"][0]["prize_paid"], 11);

    let (status, err) = call(&app, Method::POST, &format!("/api/mines/rounds/{}/cashout", id), Some(ALICE), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"]["code"], "INVALID_ROUND_STATE");
}

#[tokio::test]
async fn test_error_statuses() {
    let app = app();

    let (status, err) = call(&app, Method::POST, "/api/mines/rounds", Some(ALICE), Some(json!({"bet": 500, "mines": 3}))).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(err["error"]["code"], "INSUFFICIENT_FUNDS");

    let (status, err) = call(&app, Method::POST, "/api/mines/rounds", Some(ALICE), Some(json!({"bet": 10, "mines": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"]["code"], "VALIDATION_ERROR");

    let (status, err) = call(&app, Method::POST, "/api/mines/rounds", Some(ALICE), Some(json!({"bet": -5, "mines": 3}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"]["code"], "BAD_REQUEST");

    let (status, err) = call(&app, Method::GET, "/api/mines/rounds/no-such-round", Some(ALICE), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["error"]["code"], "ROUND_NOT_FOUND");
}

#[tokio::test]
async fn test_rounds_are_private() {
    let app = app();

    let (_, round) = call(&app, Method::POST, "/api/mines/rounds", Some(ALICE), Some(json!({"bet": 10, "mines": 3}))).await;
    let id = round["round_id"].as_str().unwrap().to_string();

    let (status, _) = call(&app, Method::POST, &format!("/api/mines/rounds/{}/cashout", id), Some(BOB), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, Method::GET, &format!("/api/mines/rounds/{}", id), Some(BOB), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, me) = call(&app, Method::GET, "/api/me", Some(ALICE), None).await;
    assert_eq!(me["balance"], 90);
}

#[tokio::test]
async fn test_loss_and_top_up() {
    let app = app();

    let (_, round) = call(&app, Method::POST, "/api/mines/rounds", Some(BOB), Some(json!({"bet": 60, "mines": 3}))).await;
    let id = round["round_id"].as_str().unwrap().to_string();

    let (_, lost) = call(&app, Method::POST, &format!("/api/mines/rounds/{}/reveal", id), Some(BOB), Some(json!({"index": 2}))).await;
    assert_eq!(lost["status"], "lost");
    assert_eq!(lost["current_prize"], 0);

    let (status, err) = call(&app, Method::POST, &format!("/api/mines/rounds/{}/reveal", id), Some(BOB), Some(json!({"index": 3}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"]["code"], "INVALID_ROUND_STATE");

    let (status, me) = call(&app, Method::POST, "/api/topup", Some(BOB), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["balance"], 100);
}

#[tokio::test]
async fn test_odds_and_metrics() {
    let app = app();

    let (status, odds) = call(&app, Method::GET, "/api/mines/odds?bet=10&mines=3", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(odds["steps"].as_array().unwrap().len(), 23);
    assert_eq!(odds["steps"][2]["prize"], 12);

    let (status, _) = call(&app, Method::GET, "/api/mines/odds?bet=10", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    call(&app, Method::POST, "/api/mines/rounds", Some(ALICE), Some(json!({"bet": 10, "mines": 3}))).await;
    let response = app
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("mines_rounds_started_total 1"));
    assert!(text.contains("mines_coins_wagered_total 10"));
}

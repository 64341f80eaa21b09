//! In-process end-to-end tests against the full router

use crate::api;
use crate::state::AppState;
use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode};
use serde_json::json;
use shared::log::LogEntry;
use std::time::Duration;
use tower::ServiceExt;

fn app() -> (Router, AppState) {
    let state = AppState::for_tests();
    (api::create_router(state.clone()), state)
}

async fn response_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(app: &Router, subject: &str) -> String {
    let resp = app
        .clone()
        .oneshot(
            Request::post("/api/v1/login")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "subject_id": subject }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = response_json(resp).await;
    assert_eq!(body["token_type"], "bearer");
    body["access_token"].as_str().unwrap().to_string()
}

async fn write_log(app: &Router, token: &str, payload: &str, outcome: &str) -> LogEntry {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/v1/logs")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {token}"))
                .body(Body::from(
                    json!({ "payload": payload, "outcome": outcome }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    serde_json::from_value(response_json(resp).await).unwrap()
}

async fn verify(app: &Router, log_id: &str) -> (StatusCode, serde_json::Value) {
    let resp = app
        .clone()
        .oneshot(
            Request::get(format!("/api/v1/verify/{log_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    (status, response_json(resp).await)
}

#[tokio::test]
async fn login_write_verify_then_detect_tampering() {
    let (app, state) = app();
    let token = login(&app, "alice").await;

    let entry = write_log(&app, &token, "SELECT * FROM accounts", "SUCCESS").await;
    assert_eq!(entry.subject_id, "alice");
    assert_eq!(entry.digest.len(), 64);
    assert!(entry.digest.chars().all(|c| c.is_ascii_hexdigit()));

    // Clean entry verifies and earns a token
    let (status, body) = verify(&app, &entry.id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verification"]["valid"], true);
    assert!(body["verification"]["verification_token"].is_string());

    // Tamper with the stored outcome out of band
    let mut raw = state.store.get_raw(&entry.id).unwrap().unwrap();
    raw["outcome"] = json!("ERROR");
    state.store.put_raw(&entry.id, &raw).unwrap();

    let (status, body) = verify(&app, &entry.id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verification"]["valid"], false);
    assert_eq!(
        body["verification"]["error"],
        "Hash verification failed - log may have been tampered with"
    );
    assert!(body["verification"]["verification_token"].is_null());
}

#[tokio::test]
async fn verify_unknown_id_is_404() {
    let (app, _state) = app();
    let (status, body) = verify(&app, "no-such-entry").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 3);
}

#[tokio::test]
async fn login_rejects_empty_subject() {
    let (app, _state) = app();
    for body in [json!({ "subject_id": "" }), json!({ "subject_id": "   " })] {
        let resp = app
            .clone()
            .oneshot(
                Request::post("/api/v1/login")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn write_requires_a_valid_session() {
    let (app, _state) = app();

    // No token at all
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/v1/logs")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "payload": "q", "outcome": "SUCCESS" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(resp).await["code"], 1001);

    // Token that was never issued
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/v1/logs")
                .header("content-type", "application/json")
                .header("authorization", "Bearer forged-token")
                .body(Body::from(json!({ "payload": "q", "outcome": "SUCCESS" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(resp).await["code"], 1002);
}

#[tokio::test]
async fn write_rejects_empty_payload() {
    let (app, _state) = app();
    let token = login(&app, "alice").await;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/v1/logs")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {token}"))
                .body(Body::from(json!({ "payload": " ", "outcome": "SUCCESS" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn writes_reach_live_subscribers_in_order() {
    let (app, state) = app();
    state.start_background_tasks();

    let (_conn_id, mut rx) = state.hub.subscribe(None);

    let alice = login(&app, "a").await;
    let bob = login(&app, "b").await;
    write_log(&app, &alice, "first", "SUCCESS").await;
    write_log(&app, &bob, "second", "SUCCESS").await;
    write_log(&app, &alice, "third", "SUCCESS").await;

    let mut seen = Vec::new();
    for _ in 0..3 {
        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("push not delivered")
            .expect("hub dropped subscriber");
        let entry: LogEntry = serde_json::from_str(&message).unwrap();
        seen.push((entry.subject_id, entry.payload));
    }
    assert_eq!(
        seen,
        [
            ("a".to_string(), "first".to_string()),
            ("b".to_string(), "second".to_string()),
            ("a".to_string(), "third".to_string()),
        ]
    );
    // Exactly three: nothing else arrives
    assert!(
        tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn health_and_welcome_respond() {
    let (app, _state) = app();

    let resp = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(response_json(resp).await["status"], "ok");

    let resp = app
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = response_json(resp).await;
    assert!(body["endpoints"]["write_log"].is_string());
}

//! API routes

pub mod auth;
pub mod health;
pub mod logs;
pub mod ws;

use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // Versioned REST API
    let api = Router::new()
        .route("/api/v1/login", post(auth::login))
        .route("/api/v1/logs", put(logs::write_log))
        .route("/api/v1/verify/{log_id}", get(logs::verify_log));

    // WebSocket endpoints (query-parameter auth; browsers cannot set
    // headers on WS upgrades)
    let stream = Router::new()
        .route("/ws/logs", get(ws::handle_logs_ws))
        .route("/ws/stream", get(ws::handle_stream_ws));

    Router::new()
        .route("/", get(health::welcome))
        .route("/health", get(health::health_check))
        .merge(api)
        .merge(stream)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

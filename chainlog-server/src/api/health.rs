//! Health check and welcome endpoints

use axum::Json;

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chainlog-server",
        "version": env!("CARGO_PKG_VERSION"),
        "git_hash": option_env!("GIT_HASH").unwrap_or("dev"),
    }))
}

/// GET / — service banner with an endpoint directory
pub async fn welcome() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Tamper-evident audit log service",
        "endpoints": {
            "login": "POST /api/v1/login",
            "write_log": "PUT /api/v1/logs",
            "verify": "GET /api/v1/verify/{log_id}",
            "logs_ws": "WS /ws/logs?subject_id&limit&offset",
            "stream_ws": "WS /ws/stream?subject_id",
            "health": "GET /health",
        },
    }))
}

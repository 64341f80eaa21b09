//! Login endpoint — subject identification and session issuance

use crate::error::ServiceResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use shared::error::AppError;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub subject_id: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

/// POST /api/v1/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ServiceResult<Json<TokenResponse>> {
    let subject_id = req.subject_id.trim();
    if subject_id.is_empty() {
        return Err(AppError::validation("subject_id must not be empty").into());
    }

    let token = state.sessions.create(subject_id)?;
    tracing::info!(subject_id, "session created");

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer",
    }))
}

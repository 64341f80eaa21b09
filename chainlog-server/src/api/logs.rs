//! Log write and verification endpoints

use crate::auth::AuthSubject;
use crate::error::ServiceResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use shared::error::AppError;
use shared::log::LogEntry;

#[derive(Debug, Deserialize)]
pub struct WriteLogRequest {
    pub payload: String,
    pub outcome: String,
}

/// PUT /api/v1/logs — seal and store one entry for the authenticated
/// subject, returning it as stored
pub async fn write_log(
    State(state): State<AppState>,
    AuthSubject(subject_id): AuthSubject,
    Json(req): Json<WriteLogRequest>,
) -> ServiceResult<Json<LogEntry>> {
    if req.payload.trim().is_empty() {
        return Err(AppError::validation("payload must not be empty").into());
    }

    let entry = state.chain.seal(&subject_id, &req.payload, &req.outcome);
    state.store.append(&entry)?;

    // Fire-and-forget: the write path never waits on the ledger
    if let Some(anchor) = &state.anchor {
        anchor.record(&entry.digest);
    }

    tracing::debug!(log_id = entry.id, subject_id, "entry stored");
    Ok(Json(entry))
}

/// GET /api/v1/verify/{log_id} — recompute the digest over the stored
/// record; tampering is a structured result, not an error
pub async fn verify_log(
    State(state): State<AppState>,
    Path(log_id): Path<String>,
) -> ServiceResult<Json<serde_json::Value>> {
    let record = state
        .store
        .get_raw(&log_id)?
        .ok_or_else(|| AppError::not_found("log entry"))?;

    let verification = state.chain.verify_record(&record);
    if !verification.valid {
        tracing::warn!(log_id, error = ?verification.error, "verification failed");
    }

    Ok(Json(serde_json::json!({
        "log_id": log_id,
        "verification": verification,
    })))
}

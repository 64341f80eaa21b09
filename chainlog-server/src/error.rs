//! Unified service-layer error type
//!
//! `ServiceError` bridges storage-layer errors (`StoreError`) and the
//! API-layer error (`AppError`). It enables `?` propagation without
//! manual `.map_err(|e| { tracing::error!(...); AppError::new(...) })`
//! boilerplate.

use crate::store::StoreError;
use axum::response::IntoResponse;
use shared::error::{AppError, ErrorCode};

/// Service-layer error — only two variants, keeps things simple.
///
/// - `Store`: storage/infrastructure errors (auto-logged, mapped to StoreUnavailable)
/// - `App`: business-rule errors (transparent pass-through to client)
#[derive(Debug)]
pub enum ServiceError {
    /// Storage or infrastructure error (redb, serde)
    Store(StoreError),
    /// Business-rule error (already an AppError with the correct ErrorCode)
    App(AppError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        ServiceError::Store(e)
    }
}

impl From<AppError> for ServiceError {
    fn from(e: AppError) -> Self {
        ServiceError::App(e)
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::App(app_err) => app_err,
            ServiceError::Store(store_err) => {
                tracing::error!(error = %store_err, "Storage error");
                AppError::new(ErrorCode::StoreUnavailable)
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

/// Convenience type alias for service-layer results
pub type ServiceResult<T> = Result<T, ServiceError>;

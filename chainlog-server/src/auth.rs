//! Session Auth Extractor
//!
//! Custom extractor resolving the `Authorization: Bearer` token to the
//! session's subject

use axum::{extract::FromRequestParts, http::request::Parts};
use shared::error::AppError;

use crate::error::ServiceError;
use crate::state::AppState;

/// Authenticated subject id, resolved from a session token
///
/// Use this extractor in protected handlers; unknown and expired tokens
/// are both rejected as invalid credentials.
#[derive(Debug, Clone)]
pub struct AuthSubject(pub String);

impl FromRequestParts<AppState> for AuthSubject {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let token = match auth_header.and_then(extract_bearer) {
            Some(token) => token,
            None => {
                tracing::warn!(uri = %parts.uri, "request without bearer token");
                return Err(AppError::not_authenticated());
            }
        };

        match state.sessions.resolve(token) {
            Ok(Some(subject_id)) => Ok(AuthSubject(subject_id)),
            Ok(None) => {
                tracing::warn!(uri = %parts.uri, "invalid or expired session token");
                Err(AppError::invalid_credentials())
            }
            Err(e) => Err(ServiceError::from(e).into()),
        }
    }
}

fn extract_bearer(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_extraction() {
        assert_eq!(extract_bearer("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer("Bearer "), None);
        assert_eq!(extract_bearer("Basic abc123"), None);
        assert_eq!(extract_bearer("abc123"), None);
    }
}

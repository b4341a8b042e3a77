//! Bearer-token guard for the shipping zone editor.

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use secrecy::ExposeSecret;

use crate::error::AppError;
use crate::state::AppState;

/// Extractor that admits requests carrying `Authorization: Bearer <ADMIN_API_TOKEN>`.
///
/// Without a configured token the editor is disabled and answers 404.
///
/// # Example
///
/// ```rust,ignore
/// async fn reset_zones(_admin: RequireAdmin, State(state): State<AppState>) -> Result<Json<..>> {
///     ...
/// }
/// ```
pub struct RequireAdmin;

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let expected = state
            .config()
            .admin_api_token
            .as_ref()
            .ok_or_else(|| AppError::NotFound("shipping zone editor".to_owned()))?;

        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_owned()))?;

        if !tokens_match(presented, expected.expose_secret()) {
            tracing::warn!("Rejected admin request with invalid token");
            return Err(AppError::Unauthorized("invalid token".to_owned()));
        }
        Ok(Self)
    }
}

/// Constant-time string comparison.
fn tokens_match(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

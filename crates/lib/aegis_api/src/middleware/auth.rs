//! Authentication middleware — access-token extraction and verification.
//!
//! The token is taken from the `access_token` cookie when present, else
//! from an `Authorization: Bearer` header.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::CookieJar;

use aegis_core::token::AccessClaims;

use crate::AppState;
use crate::error::ApiError;
use crate::services::cookies;

/// Verified claims injected into request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub AccessClaims);

pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = jar
        .get(cookies::ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| {
            request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(str::to_string)
        })
        .ok_or(ApiError::InvalidToken {
            tag: "invalid_token",
            message: "missing access token",
        })?;

    let claims = state.auth.verify_access(&token)?;
    request.extensions_mut().insert(AuthenticatedUser(claims));

    Ok(next.run(request).await)
}

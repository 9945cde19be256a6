//! HTTP-edge error rendering.
//!
//! The core's closed error sums are converted here into status codes and
//! the `{success, message, error}` envelope. Private distinctions (user
//! not found vs password mismatch) were already collapsed in the core.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use aegis_core::auth::AuthError;
use aegis_core::oauth::{InvalidGrantKind, OAuthError};
use aegis_core::token::TokenError;

/// Convenience alias for handler return types.
pub type ApiResult<T> = Result<T, ApiError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    /// Registration collision; the tag names the colliding field.
    #[error("{message}")]
    Conflict {
        tag: &'static str,
        message: &'static str,
    },

    #[error("invalid credentials")]
    InvalidCredentials,

    /// Access or refresh token unusable for any reason; the tag carries
    /// the sub-case (`invalid_token`, `expired`, `revoked`).
    #[error("{message}")]
    InvalidToken {
        tag: &'static str,
        message: &'static str,
    },

    #[error("{0}")]
    Forbidden(String),

    #[error("unknown client")]
    UnknownClient,

    #[error("redirect_uri is not registered for this client")]
    BadRedirect,

    #[error("invalid client credentials")]
    InvalidClient,

    #[error("invalid grant")]
    InvalidGrant(InvalidGrantKind),

    #[error("internal server error")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, tag) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            ApiError::Conflict { tag, .. } => (StatusCode::CONFLICT, *tag),
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            ApiError::InvalidToken { tag, .. } => (StatusCode::UNAUTHORIZED, *tag),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::UnknownClient => (StatusCode::BAD_REQUEST, "unknown_client"),
            ApiError::BadRedirect => (StatusCode::BAD_REQUEST, "invalid_redirect_uri"),
            ApiError::InvalidClient => (StatusCode::UNAUTHORIZED, "invalid_client"),
            ApiError::InvalidGrant(kind) => (StatusCode::BAD_REQUEST, kind.tag()),
            ApiError::Internal(detail) => {
                tracing::error!(%detail, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };
        let body = Json(ErrorBody {
            success: false,
            message: self.to_string(),
            error: Some(tag),
        });
        (status, body).into_response()
    }
}

/// Unparseable request bodies render through the same envelope as every
/// other validation failure.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

/// Token-verification failures surfacing directly at the edge (the
/// access-token paths; refresh failures come wrapped in `AuthError`).
impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => ApiError::InvalidToken {
                tag: "expired",
                message: "access token expired",
            },
            TokenError::Malformed | TokenError::ClaimMismatch => ApiError::InvalidToken {
                tag: "invalid_token",
                message: "invalid access token",
            },
            TokenError::Signing(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Validation(message) => ApiError::Validation(message),
            AuthError::EmailTaken => ApiError::Conflict {
                tag: "email_taken",
                message: "email already registered",
            },
            AuthError::UsernameTaken => ApiError::Conflict {
                tag: "username_taken",
                message: "username already taken",
            },
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::InvalidRefresh => ApiError::InvalidToken {
                tag: "invalid_token",
                message: "invalid refresh token",
            },
            AuthError::Revoked => ApiError::InvalidToken {
                tag: "revoked",
                message: "refresh token revoked",
            },
            AuthError::Expired => ApiError::InvalidToken {
                tag: "expired",
                message: "refresh token expired",
            },
            AuthError::Token(e) => e.into(),
            AuthError::Crypto(e) => ApiError::Internal(e.to_string()),
            AuthError::Repo(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<OAuthError> for ApiError {
    fn from(e: OAuthError) -> Self {
        match e {
            OAuthError::InvalidRequest(message) => ApiError::Validation(message),
            OAuthError::UnknownClient => ApiError::UnknownClient,
            OAuthError::BadRedirect => ApiError::BadRedirect,
            OAuthError::InvalidClient => ApiError::InvalidClient,
            OAuthError::InvalidGrant(kind) => ApiError::InvalidGrant(kind),
            OAuthError::Token(e) => e.into(),
            OAuthError::Crypto(e) => ApiError::Internal(e.to_string()),
            OAuthError::Repo(e) => ApiError::Internal(e.to_string()),
        }
    }
}

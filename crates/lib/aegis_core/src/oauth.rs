//! OAuth service: the `/authorize` state machine, authorization-code
//! issuance, and the `/token` exchange.
//!
//! An authorization code moves `Fresh -> Used` exactly once (or dies by
//! expiry). The transition happens through the repository's conditional
//! update, so at most one concurrent exchange per code can produce tokens.

use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::{info, warn};
use url::form_urlencoded;
use uuid::Uuid;

use crate::crypto;
use crate::models::{AuthCode, RefreshRecord};
use crate::repo::{AuthCodeRepo, ClientRepo, RefreshTokenRepo, RepoError, UserRepo};
use crate::token::{TokenCodec, TokenError};

/// Machine-readable sub-case of an `invalid_grant` failure. The human
/// message stays uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidGrantKind {
    UnknownCode,
    AlreadyUsed,
    Expired,
    RedirectMismatch,
    UserGone,
}

impl InvalidGrantKind {
    pub fn tag(self) -> &'static str {
        match self {
            InvalidGrantKind::UnknownCode => "unknown_code",
            InvalidGrantKind::AlreadyUsed => "already_used",
            InvalidGrantKind::Expired => "expired",
            InvalidGrantKind::RedirectMismatch => "redirect_mismatch",
            InvalidGrantKind::UserGone => "user_gone",
        }
    }
}

/// OAuth protocol failures.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown client")]
    UnknownClient,

    #[error("redirect_uri is not registered for this client")]
    BadRedirect,

    #[error("invalid client credentials")]
    InvalidClient,

    #[error("invalid grant")]
    InvalidGrant(InvalidGrantKind),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Raw `/authorize` query parameters, presence not yet validated.
#[derive(Debug, Clone, Default)]
pub struct AuthorizeParams {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub state: Option<String>,
}

/// Where `/authorize` sends the user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeOutcome {
    /// Redirect to the validated redirect URI with `code` (and `state`).
    CodeRedirect(String),
    /// Redirect to the login page, original parameters preserved.
    LoginRedirect(String),
}

/// Raw `/token` body parameters, presence not yet validated.
#[derive(Debug, Clone, Default)]
pub struct TokenParams {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

/// A successful `/token` exchange.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

pub struct OAuthService {
    users: Arc<dyn UserRepo>,
    clients: Arc<dyn ClientRepo>,
    auth_codes: Arc<dyn AuthCodeRepo>,
    refresh_tokens: Arc<dyn RefreshTokenRepo>,
    codec: Arc<TokenCodec>,
    code_ttl: Duration,
    login_path: String,
    email_verification_required: bool,
}

fn require(value: Option<String>, name: &str) -> Result<String, OAuthError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuthError::InvalidRequest(format!("{name} is required")))
}

/// Append query pairs to a URI that may already carry a query string.
fn with_query(base: &str, pairs: &[(&str, &str)]) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        query.append_pair(key, value);
    }
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}{}", query.finish())
}

impl OAuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserRepo>,
        clients: Arc<dyn ClientRepo>,
        auth_codes: Arc<dyn AuthCodeRepo>,
        refresh_tokens: Arc<dyn RefreshTokenRepo>,
        codec: Arc<TokenCodec>,
        code_ttl_secs: i64,
        login_path: impl Into<String>,
        email_verification_required: bool,
    ) -> Self {
        Self {
            users,
            clients,
            auth_codes,
            refresh_tokens,
            codec,
            code_ttl: Duration::seconds(code_ttl_secs),
            login_path: login_path.into(),
            email_verification_required,
        }
    }

    /// The `/authorize` state machine.
    ///
    /// Parameter and client validation failures are terminal errors and
    /// never redirect anywhere. A missing or unusable SSO session (or a
    /// failed email-verification policy) redirects to the login page with
    /// the original parameters preserved.
    pub async fn authorize(
        &self,
        params: AuthorizeParams,
        sso_token: Option<&str>,
    ) -> Result<AuthorizeOutcome, OAuthError> {
        let client_id = require(params.client_id, "client_id")?;
        let redirect_uri = require(params.redirect_uri, "redirect_uri")?;
        let response_type = require(params.response_type, "response_type")?;
        if response_type != "code" {
            return Err(OAuthError::InvalidRequest(
                "response_type must be \"code\"".into(),
            ));
        }

        let client = self
            .clients
            .find_by_client_id(&client_id)
            .await?
            .ok_or(OAuthError::UnknownClient)?;

        // Byte-exact whitelist membership; no prefix or scheme matching.
        if !client.allowed_redirect_uris.iter().any(|u| u == &redirect_uri) {
            warn!(%client_id, "rejected unregistered redirect_uri");
            return Err(OAuthError::BadRedirect);
        }

        let session = sso_token.and_then(|t| self.codec.verify_access(t).ok());
        let claims = match session {
            Some(claims) if !self.email_verification_required || claims.email_verified => claims,
            _ => {
                let mut pairs = vec![
                    ("client_id", client_id.as_str()),
                    ("redirect_uri", redirect_uri.as_str()),
                    ("response_type", "code"),
                ];
                if let Some(state) = params.state.as_deref() {
                    pairs.push(("state", state));
                }
                return Ok(AuthorizeOutcome::LoginRedirect(with_query(
                    &self.login_path,
                    &pairs,
                )));
            }
        };

        let code = crypto::new_auth_code();
        self.auth_codes
            .insert(AuthCode {
                code: code.clone(),
                user_id: claims.user_id,
                client_id: client_id.clone(),
                redirect_uri: redirect_uri.clone(),
                expires_at: Utc::now() + self.code_ttl,
                used: false,
            })
            .await?;

        info!(%client_id, user_id = %claims.user_id, "issued authorization code");

        let mut pairs = vec![("code", code.as_str())];
        if let Some(state) = params.state.as_deref() {
            pairs.push(("state", state));
        }
        Ok(AuthorizeOutcome::CodeRedirect(with_query(
            &redirect_uri,
            &pairs,
        )))
    }

    /// The `/token` exchange. Validation order is load-bearing; each
    /// failure is terminal and nothing mutates before the conditional
    /// used-flag flip.
    pub async fn exchange(&self, params: TokenParams) -> Result<TokenGrant, OAuthError> {
        let grant_type = require(params.grant_type, "grant_type")?;
        let code = require(params.code, "code")?;
        let client_id = require(params.client_id, "client_id")?;
        let client_secret = require(params.client_secret, "client_secret")?;
        let redirect_uri = require(params.redirect_uri, "redirect_uri")?;
        if grant_type != "authorization_code" {
            return Err(OAuthError::InvalidRequest(
                "grant_type must be \"authorization_code\"".into(),
            ));
        }

        let client = self
            .clients
            .find_by_client_id(&client_id)
            .await?
            .ok_or(OAuthError::InvalidClient)?;
        if !crypto::verify_password(&client_secret, &client.client_secret_hash)? {
            warn!(%client_id, "client secret mismatch");
            return Err(OAuthError::InvalidClient);
        }

        let record = self
            .auth_codes
            .find_by_code(&code)
            .await?
            .filter(|r| r.client_id == client_id)
            .ok_or(OAuthError::InvalidGrant(InvalidGrantKind::UnknownCode))?;

        if record.used {
            return Err(OAuthError::InvalidGrant(InvalidGrantKind::AlreadyUsed));
        }
        if Utc::now() > record.expires_at {
            return Err(OAuthError::InvalidGrant(InvalidGrantKind::Expired));
        }
        if record.redirect_uri != redirect_uri {
            return Err(OAuthError::InvalidGrant(InvalidGrantKind::RedirectMismatch));
        }

        let user = self
            .users
            .find_by_id(record.user_id)
            .await?
            .ok_or(OAuthError::InvalidGrant(InvalidGrantKind::UserGone))?;

        // The one-time transition. A lost race fails exactly like a
        // replay observed after the fact.
        if !self.auth_codes.mark_used(&code).await? {
            return Err(OAuthError::InvalidGrant(InvalidGrantKind::AlreadyUsed));
        }

        let token_id = Uuid::now_v7();
        let access_token = self.codec.sign_access(&user)?;
        let refresh_token = self.codec.sign_refresh(user.id, token_id)?;
        let id_token = self.codec.sign_id(&user)?;

        self.refresh_tokens
            .insert(RefreshRecord {
                id: token_id,
                user_id: user.id,
                token_hash: crypto::token_digest(&refresh_token),
                expires_at: Utc::now() + Duration::seconds(self.codec.refresh_ttl_secs()),
                revoked: false,
                last_used_at: None,
            })
            .await?;

        info!(%client_id, user_id = %user.id, "exchanged authorization code");

        Ok(TokenGrant {
            access_token,
            refresh_token,
            id_token,
            token_type: "Bearer",
            expires_in: self.codec.access_ttl_secs(),
        })
    }
}

//! Domain models.
//!
//! These are internal domain models, distinct from the wire-level request
//! and response shapes defined at the HTTP edge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity principal.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    /// Stored lowercased; equality is case-insensitive.
    pub email: String,
    pub username: Option<String>,
    pub password_hash: String,
    pub name: Option<String>,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The externally visible view of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub name: Option<String>,
    pub email_verified: bool,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            name: user.name.clone(),
            email_verified: user.email_verified,
        }
    }
}

/// Input for user creation. The id and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: Option<String>,
    pub password_hash: String,
    pub name: Option<String>,
}

/// Server-side record of an issued refresh token.
///
/// Only the SHA-256 digest of the token is stored; the raw value never
/// touches persistence.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// A short-lived, one-time capability binding an authenticated user to a
/// specific client and redirect URI.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthCode {
    pub code: String,
    pub user_id: Uuid,
    pub client_id: String,
    pub redirect_uri: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

/// A registered relying party.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Client {
    pub client_id: String,
    pub client_secret_hash: String,
    pub name: String,
    /// Exact-match whitelist; no prefix or scheme-only matching.
    pub allowed_redirect_uris: Vec<String>,
}

/// Login identifier, discriminated once at the parse boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Email(String),
    Username(String),
}

impl Identifier {
    /// Anything containing `@` is treated as an email (and lowercased to
    /// match storage); everything else is a username.
    pub fn parse(raw: &str) -> Self {
        if raw.contains('@') {
            Identifier::Email(raw.to_lowercase())
        } else {
            Identifier::Username(raw.to_string())
        }
    }
}

//! JWT signing and verification for the three token kinds.
//!
//! Access and ID tokens are signed with the access secret and pinned to
//! the IdP issuer and audience. Refresh tokens use a distinct secret so a
//! leaked access secret cannot forge them, and carry no audience.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::User;

/// Token verification failures, by class. Each class maps to a distinct
/// error at the caller.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("malformed token or bad signature")]
    Malformed,

    #[error("issuer or audience mismatch")]
    ClaimMismatch,

    #[error("token signing failed: {0}")]
    Signing(String),
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => TokenError::ClaimMismatch,
        _ => TokenError::Malformed,
    }
}

/// Claims carried by access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub email: String,
    #[serde(rename = "emailVerified")]
    pub email_verified: bool,
}

/// Claims carried by refresh tokens. No audience; `tokenId` is unique per
/// issuance and doubles as the server-side record id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    #[serde(rename = "tokenId")]
    pub token_id: Uuid,
}

/// Claims carried by ID tokens, intended to be decoded by relying parties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdClaims {
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    #[serde(rename = "emailVerified")]
    pub email_verified: bool,
}

/// Signs and verifies the three JWT kinds (HS256).
pub struct TokenCodec {
    access_enc: EncodingKey,
    access_dec: DecodingKey,
    refresh_enc: EncodingKey,
    refresh_dec: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(
        access_secret: &[u8],
        refresh_secret: &[u8],
        issuer: impl Into<String>,
        audience: impl Into<String>,
        access_ttl_secs: i64,
        refresh_ttl_secs: i64,
    ) -> Self {
        Self {
            access_enc: EncodingKey::from_secret(access_secret),
            access_dec: DecodingKey::from_secret(access_secret),
            refresh_enc: EncodingKey::from_secret(refresh_secret),
            refresh_dec: DecodingKey::from_secret(refresh_secret),
            issuer: issuer.into(),
            audience: audience.into(),
            access_ttl: Duration::seconds(access_ttl_secs),
            refresh_ttl: Duration::seconds(refresh_ttl_secs),
        }
    }

    /// Access-token lifetime in seconds, as reported in `expires_in`.
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Refresh-token lifetime in seconds.
    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl.num_seconds()
    }

    pub fn sign_access(&self, user: &User) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = AccessClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: (now + self.access_ttl).timestamp(),
            iat: now.timestamp(),
            user_id: user.id,
            email: user.email.clone(),
            email_verified: user.email_verified,
        };
        encode(&Header::default(), &claims, &self.access_enc)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn sign_refresh(&self, user_id: Uuid, token_id: Uuid) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = RefreshClaims {
            iss: self.issuer.clone(),
            exp: (now + self.refresh_ttl).timestamp(),
            iat: now.timestamp(),
            user_id,
            token_id,
        };
        encode(&Header::default(), &claims, &self.refresh_enc)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// ID tokens share the access secret and lifetime.
    pub fn sign_id(&self, user: &User) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = IdClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: (now + self.access_ttl).timestamp(),
            iat: now.timestamp(),
            user_id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            email_verified: user.email_verified,
        };
        encode(&Header::default(), &claims, &self.access_enc)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        decode::<AccessClaims>(token, &self.access_dec, &validation)
            .map(|data| data.claims)
            .map_err(classify)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_aud = false;
        decode::<RefreshClaims>(token, &self.refresh_dec, &validation)
            .map(|data| data.claims)
            .map_err(classify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "alice@x.test".into(),
            username: Some("alice".into()),
            password_hash: "irrelevant".into(),
            name: Some("Alice".into()),
            email_verified: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn codec() -> TokenCodec {
        TokenCodec::new(
            b"access-secret",
            b"refresh-secret",
            "aegis-idp",
            "aegis-apps",
            86_400,
            86_400 * 30,
        )
    }

    #[test]
    fn access_token_round_trip() {
        let user = test_user();
        let token = codec().sign_access(&user).unwrap();
        let claims = codec().verify_access(&token).unwrap();
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.email, "alice@x.test");
        assert!(claims.email_verified);
        assert_eq!(claims.iss, "aegis-idp");
        assert_eq!(claims.aud, "aegis-apps");
    }

    #[test]
    fn refresh_token_round_trip() {
        let user_id = Uuid::new_v4();
        let token_id = Uuid::new_v4();
        let token = codec().sign_refresh(user_id, token_id).unwrap();
        let claims = codec().verify_refresh(&token).unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.token_id, token_id);
    }

    #[test]
    fn expired_access_token_is_rejected_as_expired() {
        // TTL far enough in the past to clear the default validation leeway.
        let stale = TokenCodec::new(
            b"access-secret",
            b"refresh-secret",
            "aegis-idp",
            "aegis-apps",
            -3_600,
            86_400 * 30,
        );
        let token = stale.sign_access(&test_user()).unwrap();
        assert!(matches!(
            codec().verify_access(&token),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn tampered_token_is_malformed() {
        let token = codec().sign_access(&test_user()).unwrap();
        let mut tampered = token.clone();
        // Flip the final signature character.
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });
        assert!(matches!(
            codec().verify_access(&tampered),
            Err(TokenError::Malformed)
        ));
    }

    #[test]
    fn wrong_issuer_is_a_claim_mismatch() {
        let other = TokenCodec::new(
            b"access-secret",
            b"refresh-secret",
            "someone-else",
            "aegis-apps",
            86_400,
            86_400 * 30,
        );
        let token = other.sign_access(&test_user()).unwrap();
        assert!(matches!(
            codec().verify_access(&token),
            Err(TokenError::ClaimMismatch)
        ));
    }

    #[test]
    fn wrong_audience_is_a_claim_mismatch() {
        let other = TokenCodec::new(
            b"access-secret",
            b"refresh-secret",
            "aegis-idp",
            "someone-else",
            86_400,
            86_400 * 30,
        );
        let token = other.sign_access(&test_user()).unwrap();
        assert!(matches!(
            codec().verify_access(&token),
            Err(TokenError::ClaimMismatch)
        ));
    }

    #[test]
    fn access_secret_cannot_forge_refresh_tokens() {
        // A codec whose refresh secret equals the real access secret: its
        // refresh tokens must not verify against the real refresh key.
        let forger = TokenCodec::new(
            b"access-secret",
            b"access-secret",
            "aegis-idp",
            "aegis-apps",
            86_400,
            86_400 * 30,
        );
        let forged = forger
            .sign_refresh(Uuid::new_v4(), Uuid::new_v4())
            .unwrap();
        assert!(matches!(
            codec().verify_refresh(&forged),
            Err(TokenError::Malformed)
        ));
    }
}

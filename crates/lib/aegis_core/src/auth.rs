//! Authentication service: registration, credential verification, session
//! issuance, refresh, and revocation.

use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::info;
use url::form_urlencoded;
use uuid::Uuid;

use crate::crypto::{self, CryptoError};
use crate::models::{Identifier, NewUser, PublicUser, RefreshRecord, User};
use crate::repo::{RefreshTokenRepo, RepoError, UserRepo};
use crate::token::{AccessClaims, TokenCodec, TokenError};

/// A fixed, well-formed bcrypt hash. Verified against on the
/// user-not-found path so lookup misses and password mismatches take
/// similar time; the result is discarded.
const DUMMY_PASSWORD_HASH: &str = "$2b$12$R9h/cIPz0gi.URNNX3kh2OPST9/PgBkqquzi.Ss7KIUgO2t0jWMUW";

/// Path of the authorization endpoint a continued login redirects into.
const AUTHORIZE_PATH: &str = "/oauth/authorize";

/// Authentication failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("email already registered")]
    EmailTaken,

    #[error("username already taken")]
    UsernameTaken,

    /// Covers both unknown identifier and password mismatch; the two are
    /// indistinguishable externally.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid refresh token")]
    InvalidRefresh,

    #[error("refresh token revoked")]
    Revoked,

    #[error("refresh token expired")]
    Expired,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// An issued session: the raw access and refresh JWTs.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access: String,
    pub refresh: String,
}

/// A verified login: the user plus their freshly issued session.
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub user: User,
    pub tokens: SessionTokens,
}

/// Carries the repositories, token codec, and credential policy.
pub struct AuthService {
    users: Arc<dyn UserRepo>,
    refresh_tokens: Arc<dyn RefreshTokenRepo>,
    codec: Arc<TokenCodec>,
    hash_cost: u32,
    password_min_len: usize,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepo>,
        refresh_tokens: Arc<dyn RefreshTokenRepo>,
        codec: Arc<TokenCodec>,
        hash_cost: u32,
        password_min_len: usize,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            codec,
            hash_cost,
            password_min_len,
        }
    }

    /// Create a new account. Returns the public view of the user; issues
    /// no tokens.
    pub async fn register(
        &self,
        email: &str,
        username: Option<&str>,
        password: &str,
        name: Option<&str>,
    ) -> Result<PublicUser, AuthError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(AuthError::Validation("email is required".into()));
        }
        if password.len() < self.password_min_len {
            return Err(AuthError::Validation(format!(
                "password must be at least {} characters",
                self.password_min_len
            )));
        }

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }
        // Only queried when a username was actually supplied.
        if let Some(username) = username
            && self.users.find_by_username(username).await?.is_some()
        {
            return Err(AuthError::UsernameTaken);
        }

        let password_hash = crypto::hash_password(password, self.hash_cost)?;
        let user = self
            .users
            .insert(NewUser {
                email,
                username: username.map(str::to_string),
                password_hash,
                name: name.map(str::to_string),
            })
            .await
            .map_err(|e| match e {
                RepoError::Conflict("email") => AuthError::EmailTaken,
                RepoError::Conflict("username") => AuthError::UsernameTaken,
                other => AuthError::Repo(other),
            })?;

        info!(user_id = %user.id, "registered user");
        Ok(PublicUser::from(&user))
    }

    /// Verify a password against the account named by `identifier`.
    ///
    /// Unknown identifier and wrong password both fail with
    /// [`AuthError::InvalidCredentials`], with leveled timing.
    pub async fn authenticate(&self, identifier: &str, password: &str) -> Result<User, AuthError> {
        let user = match Identifier::parse(identifier) {
            Identifier::Email(email) => self.users.find_by_email(&email).await?,
            Identifier::Username(username) => self.users.find_by_username(&username).await?,
        };

        let Some(user) = user else {
            let _ = crypto::verify_password(password, DUMMY_PASSWORD_HASH);
            return Err(AuthError::InvalidCredentials);
        };

        if !crypto::verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(user)
    }

    /// Plain credential login: verify the password and issue a session.
    pub async fn login_direct(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<LoginSession, AuthError> {
        let user = self.authenticate(identifier, password).await?;
        let tokens = self.issue_session(&user).await?;
        Ok(LoginSession { user, tokens })
    }

    /// Credential login that continues into the authorization-code flow:
    /// issues the session and returns the `/oauth/authorize` URL, with the
    /// relying party's parameters preserved, to send the user agent to.
    pub async fn login_and_start_oauth(
        &self,
        identifier: &str,
        password: &str,
        client_id: &str,
        redirect_uri: &str,
        state: Option<&str>,
    ) -> Result<(LoginSession, String), AuthError> {
        let session = self.login_direct(identifier, password).await?;

        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("client_id", client_id);
        query.append_pair("redirect_uri", redirect_uri);
        query.append_pair("response_type", "code");
        if let Some(state) = state {
            query.append_pair("state", state);
        }
        Ok((session, format!("{AUTHORIZE_PATH}?{}", query.finish())))
    }

    /// Sign a fresh access/refresh pair and persist the refresh digest.
    pub async fn issue_session(&self, user: &User) -> Result<SessionTokens, AuthError> {
        let token_id = Uuid::now_v7();
        let access = self.codec.sign_access(user)?;
        let refresh = self.codec.sign_refresh(user.id, token_id)?;

        self.refresh_tokens
            .insert(RefreshRecord {
                id: token_id,
                user_id: user.id,
                token_hash: crypto::token_digest(&refresh),
                expires_at: Utc::now() + Duration::seconds(self.codec.refresh_ttl_secs()),
                revoked: false,
                last_used_at: None,
            })
            .await?;

        info!(user_id = %user.id, "issued session");
        Ok(SessionTokens { access, refresh })
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The refresh token itself is not rotated. Any failure is terminal;
    /// no state changes before the final step.
    pub async fn refresh(&self, raw_refresh: &str) -> Result<String, AuthError> {
        self.codec
            .verify_refresh(raw_refresh)
            .map_err(|_| AuthError::InvalidRefresh)?;

        let hash = crypto::token_digest(raw_refresh);
        let record = self
            .refresh_tokens
            .find_by_hash(&hash)
            .await?
            .ok_or(AuthError::InvalidRefresh)?;

        if record.revoked {
            return Err(AuthError::Revoked);
        }
        let now = Utc::now();
        // The stored record's expiry is authoritative even when the JWT
        // `exp` is later.
        if now > record.expires_at {
            return Err(AuthError::Expired);
        }

        let user = self
            .users
            .find_by_id(record.user_id)
            .await?
            .ok_or(AuthError::InvalidRefresh)?;

        self.refresh_tokens.mark_used(&hash, now).await?;
        Ok(self.codec.sign_access(&user)?)
    }

    /// Revoke the record behind a refresh token. Idempotent; revoking an
    /// unknown token succeeds so logout cannot leak token existence.
    pub async fn revoke(&self, raw_refresh: &str) -> Result<(), AuthError> {
        let hash = crypto::token_digest(raw_refresh);
        self.refresh_tokens.mark_revoked(&hash).await?;
        Ok(())
    }

    /// Verify a raw access token, for the HTTP edge.
    pub fn verify_access(&self, raw_access: &str) -> Result<AccessClaims, TokenError> {
        self.codec.verify_access(raw_access)
    }

    pub async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        Ok(self.users.find_by_id(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::memory::{MemoryRefreshTokenRepo, MemoryUserRepo};

    struct Fixture {
        auth: AuthService,
        refresh_tokens: Arc<MemoryRefreshTokenRepo>,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(MemoryUserRepo::new());
        let refresh_tokens = Arc::new(MemoryRefreshTokenRepo::new());
        let codec = Arc::new(TokenCodec::new(
            b"test-access-secret",
            b"test-refresh-secret",
            "aegis-idp",
            "aegis-apps",
            86_400,
            86_400 * 30,
        ));
        let auth = AuthService::new(users, refresh_tokens.clone(), codec, 4, 8);
        Fixture {
            auth,
            refresh_tokens,
        }
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let f = fixture();
        let user = f
            .auth
            .register("Alice@X.Test", Some("alice"), "correct horse", None)
            .await
            .unwrap();
        assert_eq!(user.email, "alice@x.test");

        // By email (any casing), by username, and with a wrong password.
        assert!(f.auth.authenticate("alice@x.test", "correct horse").await.is_ok());
        assert!(f.auth.authenticate("ALICE@x.test", "correct horse").await.is_ok());
        assert!(f.auth.authenticate("alice", "correct horse").await.is_ok());
        assert!(matches!(
            f.auth.authenticate("alice@x.test", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn unknown_user_and_bad_password_are_indistinguishable() {
        let f = fixture();
        f.auth
            .register("alice@x.test", None, "correct horse", None)
            .await
            .unwrap();

        let unknown = f.auth.authenticate("nobody@x.test", "whatever").await;
        let mismatch = f.auth.authenticate("alice@x.test", "whatever").await;
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
        assert!(matches!(mismatch, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let f = fixture();
        f.auth
            .register("alice@x.test", None, "correct horse", None)
            .await
            .unwrap();
        assert!(matches!(
            f.auth
                .register("ALICE@X.TEST", None, "another pass", None)
                .await,
            Err(AuthError::EmailTaken)
        ));
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let f = fixture();
        f.auth
            .register("alice@x.test", Some("alice"), "correct horse", None)
            .await
            .unwrap();
        assert!(matches!(
            f.auth
                .register("bob@x.test", Some("alice"), "another pass", None)
                .await,
            Err(AuthError::UsernameTaken)
        ));
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let f = fixture();
        assert!(matches!(
            f.auth.register("alice@x.test", None, "short", None).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn login_direct_issues_a_session() {
        let f = fixture();
        f.auth
            .register("alice@x.test", None, "correct horse", None)
            .await
            .unwrap();

        let session = f
            .auth
            .login_direct("alice@x.test", "correct horse")
            .await
            .unwrap();
        assert_eq!(session.user.email, "alice@x.test");
        assert!(f.auth.verify_access(&session.tokens.access).is_ok());
        assert_eq!(f.refresh_tokens.all().len(), 1);

        assert!(matches!(
            f.auth.login_direct("alice@x.test", "wrong password").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn login_and_start_oauth_builds_the_authorize_url() {
        let f = fixture();
        f.auth
            .register("alice@x.test", None, "correct horse", None)
            .await
            .unwrap();

        let (session, target) = f
            .auth
            .login_and_start_oauth(
                "alice@x.test",
                "correct horse",
                "appA",
                "https://a.test/cb",
                Some("xyz"),
            )
            .await
            .unwrap();
        assert!(f.auth.verify_access(&session.tokens.access).is_ok());
        assert!(target.starts_with("/oauth/authorize?"), "{target}");
        for needle in [
            "client_id=appA",
            "redirect_uri=https%3A%2F%2Fa.test%2Fcb",
            "response_type=code",
            "state=xyz",
        ] {
            assert!(target.contains(needle), "{target} missing {needle}");
        }
    }

    async fn registered_user(f: &Fixture) -> User {
        f.auth
            .register("alice@x.test", None, "correct horse", None)
            .await
            .unwrap();
        f.auth
            .authenticate("alice@x.test", "correct horse")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn session_refresh_round_trip() {
        let f = fixture();
        let user = registered_user(&f).await;
        let tokens = f.auth.issue_session(&user).await.unwrap();

        let access = f.auth.refresh(&tokens.refresh).await.unwrap();
        let claims = f.auth.verify_access(&access).unwrap();
        assert_eq!(claims.user_id, user.id);

        // Not rotated: the same refresh token keeps working.
        assert!(f.auth.refresh(&tokens.refresh).await.is_ok());

        let records = f.refresh_tokens.all();
        assert_eq!(records.len(), 1);
        assert!(records[0].last_used_at.is_some());
    }

    #[tokio::test]
    async fn raw_refresh_token_is_never_stored() {
        let f = fixture();
        let user = registered_user(&f).await;
        let tokens = f.auth.issue_session(&user).await.unwrap();

        let records = f.refresh_tokens.all();
        assert_eq!(records.len(), 1);
        assert_ne!(records[0].token_hash, tokens.refresh);
        assert_eq!(records[0].token_hash, crypto::token_digest(&tokens.refresh));
    }

    #[tokio::test]
    async fn revoked_token_refuses_every_subsequent_refresh() {
        let f = fixture();
        let user = registered_user(&f).await;
        let tokens = f.auth.issue_session(&user).await.unwrap();

        f.auth.revoke(&tokens.refresh).await.unwrap();
        for _ in 0..3 {
            assert!(matches!(
                f.auth.refresh(&tokens.refresh).await,
                Err(AuthError::Revoked)
            ));
        }
    }

    #[tokio::test]
    async fn revoking_an_unknown_token_succeeds() {
        let f = fixture();
        assert!(f.auth.revoke("not-a-real-token").await.is_ok());
    }

    #[tokio::test]
    async fn record_expiry_overrides_jwt_expiry() {
        let f = fixture();
        let user = registered_user(&f).await;
        let tokens = f.auth.issue_session(&user).await.unwrap();

        // JWT exp is 30 days out, but the record says the token is dead.
        let hash = crypto::token_digest(&tokens.refresh);
        f.refresh_tokens
            .set_expiry(&hash, Utc::now() - Duration::seconds(1));
        assert!(matches!(
            f.auth.refresh(&tokens.refresh).await,
            Err(AuthError::Expired)
        ));
    }

    #[tokio::test]
    async fn garbage_refresh_token_is_invalid() {
        let f = fixture();
        assert!(matches!(
            f.auth.refresh("definitely.not.a-jwt").await,
            Err(AuthError::InvalidRefresh)
        ));
    }

    #[tokio::test]
    async fn signed_but_untracked_refresh_token_is_invalid() {
        let f = fixture();
        // Valid signature, but no corresponding record in storage.
        let codec = TokenCodec::new(
            b"test-access-secret",
            b"test-refresh-secret",
            "aegis-idp",
            "aegis-apps",
            86_400,
            86_400 * 30,
        );
        let orphan = codec
            .sign_refresh(Uuid::new_v4(), Uuid::new_v4())
            .unwrap();
        assert!(matches!(
            f.auth.refresh(&orphan).await,
            Err(AuthError::InvalidRefresh)
        ));
    }
}

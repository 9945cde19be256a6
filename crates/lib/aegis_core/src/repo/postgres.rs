//! PostgreSQL-backed repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AuthCodeRepo, ClientRepo, RefreshTokenRepo, RepoError, UserRepo};
use crate::models::{AuthCode, Client, NewUser, RefreshRecord, User};

/// Apply the embedded schema migrations (`aegis_core/migrations/`).
/// Runs once at startup, before any repository is constructed.
pub async fn run_migrations(pool: &PgPool) -> Result<(), RepoError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Map unique-violation database errors onto [`RepoError::Conflict`],
/// naming the colliding field from the constraint.
fn map_insert_error(e: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db) = &e
        && db.is_unique_violation()
    {
        return match db.constraint() {
            Some("users_email_key") => RepoError::Conflict("email"),
            Some("users_username_key") => RepoError::Conflict("username"),
            Some("auth_codes_pkey") => RepoError::Conflict("code"),
            Some("refresh_tokens_token_hash_key") => RepoError::Conflict("token_hash"),
            _ => RepoError::Conflict("unique"),
        };
    }
    RepoError::Database(e)
}

#[derive(Clone)]
pub struct PgUserRepo {
    pool: PgPool,
}

impl PgUserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "id, email, username, password_hash, name, email_verified, created_at, updated_at";

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let row = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let row = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let row = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert(&self, user: NewUser) -> Result<User, RepoError> {
        let row = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, username, password_hash, name) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)?;
        Ok(row)
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenRepo {
    pool: PgPool,
}

impl PgRefreshTokenRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenRepo for PgRefreshTokenRepo {
    async fn insert(&self, record: RefreshRecord) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, revoked, last_used_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(record.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;
        Ok(())
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<RefreshRecord>, RepoError> {
        let row = sqlx::query_as::<_, RefreshRecord>(
            "SELECT id, user_id, token_hash, expires_at, revoked, last_used_at \
             FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn mark_revoked(&self, hash: &str) -> Result<(), RepoError> {
        sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE token_hash = $1")
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_used(&self, hash: &str, when: DateTime<Utc>) -> Result<(), RepoError> {
        sqlx::query("UPDATE refresh_tokens SET last_used_at = $2 WHERE token_hash = $1")
            .bind(hash)
            .bind(when)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgAuthCodeRepo {
    pool: PgPool,
}

impl PgAuthCodeRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthCodeRepo for PgAuthCodeRepo {
    async fn insert(&self, code: AuthCode) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO auth_codes (code, user_id, client_id, redirect_uri, expires_at, used) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&code.code)
        .bind(code.user_id)
        .bind(&code.client_id)
        .bind(&code.redirect_uri)
        .bind(code.expires_at)
        .bind(code.used)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;
        Ok(())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<AuthCode>, RepoError> {
        let row = sqlx::query_as::<_, AuthCode>(
            "SELECT code, user_id, client_id, redirect_uri, expires_at, used \
             FROM auth_codes WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn mark_used(&self, code: &str) -> Result<bool, RepoError> {
        // Conditional flip; at most one concurrent exchange observes
        // rows_affected = 1.
        let result = sqlx::query("UPDATE auth_codes SET used = true WHERE code = $1 AND used = false")
            .bind(code)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Clone)]
pub struct PgClientRepo {
    pool: PgPool,
}

impl PgClientRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientRepo for PgClientRepo {
    async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Client>, RepoError> {
        let row = sqlx::query_as::<_, Client>(
            "SELECT client_id, client_secret_hash, name, allowed_redirect_uris \
             FROM client_apps WHERE client_id = $1",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

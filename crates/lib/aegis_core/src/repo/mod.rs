//! Persistence ports.
//!
//! Opaque, capability-based repository interfaces. Concrete storage is a
//! black box to the services: `postgres` backs deployments, `memory`
//! backs tests and local development.
//!
//! Mutating operations on a single identifier are linearizable; in
//! particular [`AuthCodeRepo::mark_used`] is conditional on the record
//! being unused and reports whether this caller won the transition.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AuthCode, Client, NewUser, RefreshRecord, User};

/// Storage-layer failures.
#[derive(Debug, Error)]
pub enum RepoError {
    /// A unique constraint was violated; the payload names the field.
    #[error("conflict on {0}")]
    Conflict(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError>;
    /// Fails with [`RepoError::Conflict`] if the email or username collides.
    async fn insert(&self, user: NewUser) -> Result<User, RepoError>;
}

#[async_trait]
pub trait RefreshTokenRepo: Send + Sync {
    async fn insert(&self, record: RefreshRecord) -> Result<(), RepoError>;
    async fn find_by_hash(&self, hash: &str) -> Result<Option<RefreshRecord>, RepoError>;
    /// Idempotent; revoking an unknown or already-revoked hash is a no-op.
    async fn mark_revoked(&self, hash: &str) -> Result<(), RepoError>;
    async fn mark_used(&self, hash: &str, when: DateTime<Utc>) -> Result<(), RepoError>;
    /// Background cleanup. Returns the number of records deleted.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait AuthCodeRepo: Send + Sync {
    /// Fails with [`RepoError::Conflict`] if the code already exists.
    async fn insert(&self, code: AuthCode) -> Result<(), RepoError>;
    /// Returns the full record including `used` and `expires_at`; policy is
    /// the caller's.
    async fn find_by_code(&self, code: &str) -> Result<Option<AuthCode>, RepoError>;
    /// Conditionally flips `used` from false to true. Returns `true` iff
    /// this call performed the transition; a lost race returns `false`.
    async fn mark_used(&self, code: &str) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait ClientRepo: Send + Sync {
    async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Client>, RepoError>;
}

//! In-memory repositories.
//!
//! Back the test suites and local development mode. Maps behind standard
//! mutexes; locks are never held across an await point, and the
//! [`AuthCodeRepo::mark_used`] transition is atomic under the code map's
//! lock.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AuthCodeRepo, ClientRepo, RefreshTokenRepo, RepoError, UserRepo};
use crate::models::{AuthCode, Client, NewUser, RefreshRecord, User};

#[derive(Default)]
pub struct MemoryUserRepo {
    users: Mutex<Vec<User>>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the verification flag, standing in for the out-of-scope
    /// verification flow.
    pub fn set_email_verified(&self, id: Uuid, verified: bool) {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.id == id) {
            user.email_verified = verified;
            user.updated_at = Utc::now();
        }
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .find(|u| u.username.as_deref() == Some(username))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<User, RepoError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == user.email) {
            return Err(RepoError::Conflict("email"));
        }
        if let Some(username) = &user.username
            && users.iter().any(|u| u.username.as_ref() == Some(username))
        {
            return Err(RepoError::Conflict("username"));
        }
        let now = Utc::now();
        let stored = User {
            id: Uuid::new_v4(),
            email: user.email,
            username: user.username,
            password_hash: user.password_hash,
            name: user.name,
            email_verified: false,
            created_at: now,
            updated_at: now,
        };
        users.push(stored.clone());
        Ok(stored)
    }
}

#[derive(Default)]
pub struct MemoryRefreshTokenRepo {
    records: Mutex<HashMap<String, RefreshRecord>>,
}

impl MemoryRefreshTokenRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records, for test assertions.
    pub fn all(&self) -> Vec<RefreshRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    /// Overwrite a record's expiry, for boundary tests.
    pub fn set_expiry(&self, hash: &str, expires_at: DateTime<Utc>) {
        if let Some(record) = self.records.lock().unwrap().get_mut(hash) {
            record.expires_at = expires_at;
        }
    }
}

#[async_trait]
impl RefreshTokenRepo for MemoryRefreshTokenRepo {
    async fn insert(&self, record: RefreshRecord) -> Result<(), RepoError> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.token_hash) {
            return Err(RepoError::Conflict("token_hash"));
        }
        records.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<RefreshRecord>, RepoError> {
        Ok(self.records.lock().unwrap().get(hash).cloned())
    }

    async fn mark_revoked(&self, hash: &str) -> Result<(), RepoError> {
        if let Some(record) = self.records.lock().unwrap().get_mut(hash) {
            record.revoked = true;
        }
        Ok(())
    }

    async fn mark_used(&self, hash: &str, when: DateTime<Utc>) -> Result<(), RepoError> {
        if let Some(record) = self.records.lock().unwrap().get_mut(hash) {
            record.last_used_at = Some(when);
        }
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepoError> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, r| r.expires_at >= now);
        Ok((before - records.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryAuthCodeRepo {
    codes: Mutex<HashMap<String, AuthCode>>,
}

impl MemoryAuthCodeRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all codes, for test assertions.
    pub fn all(&self) -> Vec<AuthCode> {
        self.codes.lock().unwrap().values().cloned().collect()
    }

    /// Overwrite a code's expiry, for boundary tests.
    pub fn set_expiry(&self, code: &str, expires_at: DateTime<Utc>) {
        if let Some(record) = self.codes.lock().unwrap().get_mut(code) {
            record.expires_at = expires_at;
        }
    }
}

#[async_trait]
impl AuthCodeRepo for MemoryAuthCodeRepo {
    async fn insert(&self, code: AuthCode) -> Result<(), RepoError> {
        let mut codes = self.codes.lock().unwrap();
        if codes.contains_key(&code.code) {
            return Err(RepoError::Conflict("code"));
        }
        codes.insert(code.code.clone(), code);
        Ok(())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<AuthCode>, RepoError> {
        Ok(self.codes.lock().unwrap().get(code).cloned())
    }

    async fn mark_used(&self, code: &str) -> Result<bool, RepoError> {
        let mut codes = self.codes.lock().unwrap();
        match codes.get_mut(code) {
            Some(record) if !record.used => {
                record.used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryClientRepo {
    clients: Mutex<HashMap<String, Client>>,
}

impl MemoryClientRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client. Provisioning is administrative; there is no
    /// runtime registration endpoint.
    pub fn seed(&self, client: Client) {
        self.clients
            .lock()
            .unwrap()
            .insert(client.client_id.clone(), client);
    }
}

#[async_trait]
impl ClientRepo for MemoryClientRepo {
    async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Client>, RepoError> {
        Ok(self.clients.lock().unwrap().get(client_id).cloned())
    }
}

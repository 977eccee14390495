use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{hash_token, NewUser, RefreshTokenRecord, User, VerificationToken};
use crate::error::{AppError, AuthError};
use crate::store::{CredentialStore, RefreshTokenLedger, VerificationStore};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    verification_tokens: HashMap<Uuid, VerificationToken>,
    refresh_tokens: HashMap<Uuid, RefreshTokenRecord>,
}

/// Process-local store with the same atomicity guarantees as `PgStore`:
/// every trait method runs under one lock.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("in-memory store lock poisoned".to_string()))
    }

    /// Every verification token currently held for a user
    pub fn verification_tokens_for(&self, user_id: Uuid) -> Vec<VerificationToken> {
        self.state()
            .map(|state| {
                state
                    .verification_tokens
                    .values()
                    .filter(|t| t.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every ledger record for a user, revoked or not
    pub fn refresh_tokens_for(&self, user_id: Uuid) -> Vec<RefreshTokenRecord> {
        self.state()
            .map(|state| {
                state
                    .refresh_tokens
                    .values()
                    .filter(|r| r.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let state = self.state()?;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.state()?.users.get(&user_id).cloned())
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, AppError> {
        Ok(self.state()?.users.values().any(|u| u.email == email))
    }

    async fn insert_user(&self, user: NewUser, now: DateTime<Utc>) -> Result<User, AppError> {
        let mut state = self.state()?;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(AppError::Auth(AuthError::EmailAlreadyExists));
        }
        let user = user.into_user(now);
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn activate_user(&self, user_id: Uuid) -> Result<(), AppError> {
        if let Some(user) = self.state()?.users.get_mut(&user_id) {
            user.is_active = true;
        }
        Ok(())
    }
}

#[async_trait]
impl VerificationStore for InMemoryStore {
    async fn replace_for_user(&self, token: &VerificationToken) -> Result<(), AppError> {
        let mut state = self.state()?;
        state
            .verification_tokens
            .retain(|_, existing| existing.user_id != token.user_id);
        state.verification_tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_by_user_and_code(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<Option<VerificationToken>, AppError> {
        let state = self.state()?;
        Ok(state
            .verification_tokens
            .values()
            .filter(|t| t.user_id == user_id && t.code == code)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn consume(&self, token: &VerificationToken) -> Result<bool, AppError> {
        let mut state = self.state()?;
        if state.verification_tokens.remove(&token.id).is_none() {
            return Ok(false);
        }
        if let Some(user) = state.users.get_mut(&token.user_id) {
            user.is_active = true;
        }
        Ok(true)
    }
}

#[async_trait]
impl RefreshTokenLedger for InMemoryStore {
    async fn record(
        &self,
        user_id: Uuid,
        token: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, AppError> {
        let record = RefreshTokenRecord::new(user_id, token, issued_at, expires_at);
        let mut state = self.state()?;
        if state
            .refresh_tokens
            .values()
            .any(|existing| existing.token_hash == record.token_hash)
        {
            return Err(AppError::Internal("refresh token recorded twice".to_string()));
        }
        state.refresh_tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        let token_hash = hash_token(token);
        let state = self.state()?;
        Ok(state
            .refresh_tokens
            .values()
            .find(|r| r.token_hash == token_hash)
            .cloned())
    }

    async fn find_all_active_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshTokenRecord>, AppError> {
        let state = self.state()?;
        let mut active: Vec<RefreshTokenRecord> = state
            .refresh_tokens
            .values()
            .filter(|r| r.user_id == user_id && !r.is_revoked)
            .cloned()
            .collect();
        active.sort_by_key(|r| r.issued_at);
        Ok(active)
    }

    async fn revoke(
        &self,
        record: &RefreshTokenRecord,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut state = self.state()?;
        match state.refresh_tokens.get_mut(&record.id) {
            Some(stored) if !stored.is_revoked => {
                stored.is_revoked = true;
                stored.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all(
        &self,
        records: &[RefreshTokenRecord],
        at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut state = self.state()?;
        let mut revoked = 0;
        for record in records {
            if let Some(stored) = state.refresh_tokens.get_mut(&record.id) {
                if !stored.is_revoked {
                    stored.is_revoked = true;
                    stored.revoked_at = Some(at);
                    revoked += 1;
                }
            }
        }
        Ok(revoked)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64, AppError> {
        let mut state = self.state()?;
        let mut revoked = 0;
        for stored in state
            .refresh_tokens
            .values_mut()
            .filter(|r| r.user_id == user_id && !r.is_revoked)
        {
            stored.is_revoked = true;
            stored.revoked_at = Some(at);
            revoked += 1;
        }
        Ok(revoked)
    }
}

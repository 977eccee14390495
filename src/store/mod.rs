/// Persistence collaborators
///
/// The services only see these traits. `PgStore` backs them with Postgres;
/// `InMemoryStore` keeps everything in process for tests and local runs.
/// Both implement all three traits, so one instance can be shared.

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{NewUser, RefreshTokenRecord, User, VerificationToken};
use crate::error::AppError;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError>;

    async fn exists_by_email(&self, email: &str) -> Result<bool, AppError>;

    /// # Errors
    /// `AuthError::EmailAlreadyExists` if the email is taken, including when
    /// a concurrent signup wins the race after `exists_by_email` returned false
    async fn insert_user(&self, user: NewUser, now: DateTime<Utc>) -> Result<User, AppError>;

    /// Idempotent
    async fn activate_user(&self, user_id: Uuid) -> Result<(), AppError>;
}

#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Delete every verification token of `token.user_id`, then insert `token`,
    /// as one atomic step.
    async fn replace_for_user(&self, token: &VerificationToken) -> Result<(), AppError>;

    async fn find_by_user_and_code(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<Option<VerificationToken>, AppError>;

    /// Atomically delete the token and mark its user active.
    ///
    /// Returns false (and changes nothing) if the token no longer exists.
    async fn consume(&self, token: &VerificationToken) -> Result<bool, AppError>;
}

#[async_trait]
pub trait RefreshTokenLedger: Send + Sync {
    async fn record(
        &self,
        user_id: Uuid,
        token: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, AppError>;

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, AppError>;

    async fn find_all_active_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshTokenRecord>, AppError>;

    /// Compare-and-set on the revoked flag.
    ///
    /// Returns true only for the caller that flipped it from false to true;
    /// revoking an already revoked record is a no-op returning false.
    async fn revoke(&self, record: &RefreshTokenRecord, at: DateTime<Utc>)
        -> Result<bool, AppError>;

    /// Returns how many records this call actually revoked
    async fn revoke_all(
        &self,
        records: &[RefreshTokenRecord],
        at: DateTime<Utc>,
    ) -> Result<u64, AppError>;

    /// Revoke every unrevoked record of the user in one atomic step, so a
    /// token recorded concurrently is either revoked here or recorded after.
    async fn revoke_all_for_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64, AppError>;
}

/// The three store handles a service is built from
#[derive(Clone)]
pub struct Stores {
    pub credentials: Arc<dyn CredentialStore>,
    pub verifications: Arc<dyn VerificationStore>,
    pub ledger: Arc<dyn RefreshTokenLedger>,
}

impl Stores {
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: CredentialStore + VerificationStore + RefreshTokenLedger + 'static,
    {
        Self {
            credentials: store.clone(),
            verifications: store.clone(),
            ledger: store,
        }
    }
}

/// Ledger record for an issued refresh token.
///
/// Only the SHA-256 fingerprint of the token string is kept. Records are
/// never deleted; revocation flips `is_revoked` so a replayed token can
/// still be recognised.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Lifecycle position of a record at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTokenState {
    Issued,
    Revoked,
    Expired,
}

impl RefreshTokenRecord {
    pub fn new(
        user_id: Uuid,
        token: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            token_hash: hash_token(token),
            issued_at,
            expires_at,
            is_revoked: false,
            revoked_at: None,
        }
    }

    /// Revocation wins over expiry: a revoked token presented again is a
    /// replay even after its natural expiry.
    pub fn state_at(&self, now: DateTime<Utc>) -> RefreshTokenState {
        if self.is_revoked {
            RefreshTokenState::Revoked
        } else if self.expires_at < now {
            RefreshTokenState::Expired
        } else {
            RefreshTokenState::Issued
        }
    }
}

/// SHA-256 hex fingerprint used as the ledger lookup key
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Rotation & Reuse-Detection Engine
///
/// A refresh token is single-use. Presenting it moves its ledger record
/// from issued to revoked and yields a new pair. Presenting a revoked
/// token again is treated as theft: every active token of the user is
/// revoked before the error is returned.
///
/// Ordering inside a rotation is revoke old, mint new, record new. A crash
/// between the steps leaves the user logged out, never with two live tokens.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::TokenIssuer;
use crate::domain::{RefreshTokenState, User};
use crate::error::{AppError, AuthError};
use crate::store::{CredentialStore, RefreshTokenLedger};

/// Freshly minted credentials
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

pub struct RotationEngine {
    credentials: Arc<dyn CredentialStore>,
    ledger: Arc<dyn RefreshTokenLedger>,
    issuer: Arc<TokenIssuer>,
}

impl RotationEngine {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        ledger: Arc<dyn RefreshTokenLedger>,
        issuer: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            credentials,
            ledger,
            issuer,
        }
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// # Errors
    /// - `InvalidToken`: the string does not decode as one of our refresh tokens
    /// - `UserNotFound`: the token's subject no longer exists
    /// - `UnknownToken`: the ledger has no record of this token
    /// - `TokenReused`: the token was already revoked (all sessions are now
    ///   revoked), or a concurrent rotation of the same token won
    /// - `TokenExpired`: the ledger record is past its expiry
    pub async fn rotate(&self, incoming: &str, now: DateTime<Utc>) -> Result<TokenPair, AppError> {
        let identity = self
            .issuer
            .extract_identity(incoming, now)
            .map_err(|e| match e {
                AppError::Auth(_) => AppError::Auth(AuthError::InvalidToken),
                other => other,
            })?;

        let user = self
            .credentials
            .find_user_by_id(identity.user_id)
            .await?
            .ok_or(AppError::Auth(AuthError::UserNotFound))?;

        let record = self
            .ledger
            .find_by_token(incoming)
            .await?
            .ok_or_else(|| {
                tracing::info!(user_id = %user.id, "Refresh token not found in ledger");
                AppError::Auth(AuthError::UnknownToken)
            })?;

        match record.state_at(now) {
            RefreshTokenState::Revoked => {
                let revoked = self.revoke_family(user.id, now).await?;
                tracing::warn!(
                    user_id = %user.id,
                    token_id = %record.id,
                    revoked_sessions = revoked,
                    "Revoked refresh token presented again; all sessions revoked"
                );
                Err(AppError::Auth(AuthError::TokenReused))
            }
            RefreshTokenState::Expired => {
                tracing::info!(user_id = %user.id, token_id = %record.id, "Refresh token expired");
                Err(AppError::Auth(AuthError::TokenExpired))
            }
            RefreshTokenState::Issued => {
                if !self.ledger.revoke(&record, now).await? {
                    tracing::warn!(
                        user_id = %user.id,
                        token_id = %record.id,
                        "Lost concurrent rotation of the same refresh token"
                    );
                    return Err(AppError::Auth(AuthError::TokenReused));
                }

                let pair = self.mint_and_record(&user, now).await?;
                tracing::info!(user_id = %user.id, "Refresh token rotated");
                Ok(pair)
            }
        }
    }

    /// Collapse the user to a single new session: revoke everything active,
    /// then mint and record a fresh pair.
    pub async fn start_session(&self, user: &User, now: DateTime<Utc>) -> Result<TokenPair, AppError> {
        self.revoke_family(user.id, now).await?;
        self.mint_and_record(user, now).await
    }

    /// Revoke every active refresh token of the user. Returns how many were revoked.
    pub async fn revoke_family(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, AppError> {
        self.ledger.revoke_all_for_user(user_id, now).await
    }

    /// Revoke every session of the refresh token's owner
    pub async fn end_sessions(&self, incoming: &str, now: DateTime<Utc>) -> Result<u64, AppError> {
        let identity = self
            .issuer
            .extract_identity(incoming, now)
            .map_err(|_| AppError::Auth(AuthError::InvalidToken))?;
        let revoked = self.revoke_family(identity.user_id, now).await?;
        tracing::info!(user_id = %identity.user_id, revoked_sessions = revoked, "Sessions ended");
        Ok(revoked)
    }

    async fn mint_and_record(&self, user: &User, now: DateTime<Utc>) -> Result<TokenPair, AppError> {
        let access = self.issuer.issue_access_token(user, now)?;
        let refresh_token = self.issuer.issue_refresh_token(user, now)?;

        self.ledger
            .record(
                user.id,
                &refresh_token,
                now,
                now + self.issuer.refresh_token_ttl(),
            )
            .await?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token,
            expires_in: access.expires_in,
        })
    }
}

/// Verification Workflow
///
/// Issues, checks and retires the one-time codes that gate account
/// activation. A user holds at most one live code: issuing a new one
/// replaces whatever was there in the same store call.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::domain::{User, VerificationToken};
use crate::email_client::{verification_email_body, NotificationSender};
use crate::error::{AppError, AuthError};
use crate::store::{CredentialStore, VerificationStore};
use crate::validators::{is_valid_code, is_valid_email};

const VERIFICATION_SUBJECT: &str = "Account Verification";

pub struct VerificationWorkflow {
    credentials: Arc<dyn CredentialStore>,
    verifications: Arc<dyn VerificationStore>,
    notifier: Arc<dyn NotificationSender>,
    code_ttl: Duration,
}

impl VerificationWorkflow {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        verifications: Arc<dyn VerificationStore>,
        notifier: Arc<dyn NotificationSender>,
        code_ttl: Duration,
    ) -> Self {
        Self {
            credentials,
            verifications,
            notifier,
            code_ttl,
        }
    }

    /// Replace any live code for `user` with a fresh one and email it.
    ///
    /// Delivery failures are logged; the stored code stands either way.
    pub async fn issue_verification_code(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<VerificationToken, AppError> {
        let token = VerificationToken::issue(user.id, now, self.code_ttl);
        self.verifications.replace_for_user(&token).await?;

        tracing::info!(user_id = %user.id, expires_at = %token.expires_at, "Verification code issued");

        self.dispatch(user, &token).await;
        Ok(token)
    }

    /// # Errors
    /// - `UserNotFound`: no account for `email`
    /// - `InvalidCode`: no live code matching `code` for that user
    /// - `CodeExpired`: the matching code is past its expiry
    pub async fn verify(&self, email: &str, code: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        let email = is_valid_email(email)?;
        let code = is_valid_code(code)?;

        let user = self
            .credentials
            .find_user_by_email(&email)
            .await?
            .ok_or(AppError::Auth(AuthError::UserNotFound))?;

        let token = self
            .verifications
            .find_by_user_and_code(user.id, &code)
            .await?
            .ok_or(AppError::Auth(AuthError::InvalidCode))?;

        if token.is_expired_at(now) {
            return Err(AppError::Auth(AuthError::CodeExpired));
        }

        // a concurrent verify or resend may have removed it since the lookup
        if !self.verifications.consume(&token).await? {
            return Err(AppError::Auth(AuthError::InvalidCode));
        }

        tracing::info!(user_id = %user.id, "Account verified");
        Ok(())
    }

    /// # Errors
    /// - `UserNotFound`: no account for `email`
    /// - `AlreadyVerified`: the account is already active; nothing is sent
    pub async fn resend(&self, email: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        let email = is_valid_email(email)?;

        let user = self
            .credentials
            .find_user_by_email(&email)
            .await?
            .ok_or(AppError::Auth(AuthError::UserNotFound))?;

        if user.is_active {
            return Err(AppError::Auth(AuthError::AlreadyVerified));
        }

        self.issue_verification_code(&user, now).await?;
        Ok(())
    }

    async fn dispatch(&self, user: &User, token: &VerificationToken) {
        let body = verification_email_body(&token.code, self.code_ttl.num_minutes());
        if let Err(e) = self
            .notifier
            .send(&user.email, VERIFICATION_SUBJECT, &body)
            .await
        {
            tracing::error!(user_id = %user.id, error = %e, "Failed to send verification email");
        }
    }
}

/// Authentication Service
///
/// The surface the HTTP layer calls. Each operation reads the clock once
/// and hands that instant to every component it drives.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::auth::{validate_password, Claims, PasswordHasher, TokenIssuer};
use crate::clock::Clock;
use crate::domain::{NewUser, Role, User};
use crate::email_client::NotificationSender;
use crate::error::{AppError, AuthError};
use crate::services::rotation::{RotationEngine, TokenPair};
use crate::services::verification::VerificationWorkflow;
use crate::store::{CredentialStore, Stores};
use crate::validators::{is_valid_email, is_valid_username};

/// Signup input, unvalidated
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub username: String,
}

pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    clock: Arc<dyn Clock>,
    issuer: Arc<TokenIssuer>,
    verification: VerificationWorkflow,
    rotation: RotationEngine,
}

impl AuthService {
    pub fn new(
        stores: Stores,
        issuer: TokenIssuer,
        hasher: Arc<dyn PasswordHasher>,
        notifier: Arc<dyn NotificationSender>,
        clock: Arc<dyn Clock>,
        code_ttl: Duration,
    ) -> Self {
        let issuer = Arc::new(issuer);
        let verification = VerificationWorkflow::new(
            stores.credentials.clone(),
            stores.verifications.clone(),
            notifier,
            code_ttl,
        );
        let rotation = RotationEngine::new(
            stores.credentials.clone(),
            stores.ledger.clone(),
            issuer.clone(),
        );

        Self {
            credentials: stores.credentials,
            hasher,
            clock,
            issuer,
            verification,
            rotation,
        }
    }

    /// Create an inactive account and send it a verification code.
    ///
    /// The account and its first code are written in two store calls. If
    /// the second fails the account is left inactive without a code; the
    /// error is returned and `resend` issues one.
    ///
    /// # Errors
    /// - validation errors for malformed email, username or password
    /// - `EmailAlreadyExists`
    pub async fn signup(&self, registration: Registration) -> Result<User, AppError> {
        let now = self.clock.now();

        let email = is_valid_email(&registration.email)?;
        let username = is_valid_username(&registration.username)?;
        validate_password(&registration.password)?;

        if self.credentials.exists_by_email(&email).await? {
            return Err(AppError::Auth(AuthError::EmailAlreadyExists));
        }

        let password_hash = self.hasher.hash(&registration.password)?;
        let user = self
            .credentials
            .insert_user(
                NewUser {
                    email,
                    username,
                    password_hash,
                    role: Role::Customer,
                },
                now,
            )
            .await?;

        tracing::info!(user_id = %user.id, "User registered");

        self.verification.issue_verification_code(&user, now).await?;
        Ok(user)
    }

    /// Check credentials and start a new session. Any earlier sessions of
    /// the user are revoked first.
    ///
    /// # Errors
    /// `UserNotFound`, then `UserNotVerified`, then `BadCredentials`
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AppError> {
        let now = self.clock.now();
        let email = is_valid_email(email)?;

        let user = self
            .credentials
            .find_user_by_email(&email)
            .await?
            .ok_or(AppError::Auth(AuthError::UserNotFound))?;

        if !user.is_active {
            return Err(AppError::Auth(AuthError::UserNotVerified));
        }

        if !self.hasher.verify(password, &user.password_hash)? {
            tracing::info!(user_id = %user.id, "Login rejected: bad credentials");
            return Err(AppError::Auth(AuthError::BadCredentials));
        }

        let pair = self.rotation.start_session(&user, now).await?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(pair)
    }

    pub async fn verify(&self, email: &str, code: &str) -> Result<(), AppError> {
        let now = self.clock.now();
        self.verification.verify(email, code, now).await
    }

    pub async fn resend(&self, email: &str) -> Result<(), AppError> {
        let now = self.clock.now();
        self.verification.resend(email, now).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let now = self.clock.now();
        self.rotation.rotate(refresh_token, now).await
    }

    /// Revoke every session of the refresh token's owner
    pub async fn logout(&self, refresh_token: &str) -> Result<u64, AppError> {
        let now = self.clock.now();
        self.rotation.end_sessions(refresh_token, now).await
    }

    /// Start a session for an email an external identity provider has
    /// already confirmed. Confirmation proves control of the address, so an
    /// unverified account is activated.
    ///
    /// # Errors
    /// `UserNotFound` if no account uses the email
    pub async fn issue_for_verified_identity(&self, email: &str) -> Result<TokenPair, AppError> {
        let now = self.clock.now();
        let email = is_valid_email(email)?;

        let mut user = self
            .credentials
            .find_user_by_email(&email)
            .await?
            .ok_or(AppError::Auth(AuthError::UserNotFound))?;

        if !user.is_active {
            self.credentials.activate_user(user.id).await?;
            user.is_active = true;
            tracing::info!(user_id = %user.id, "Account activated by external identity");
        }

        self.rotation.start_session(&user, now).await
    }

    /// Decode a bearer access token
    pub fn authenticate_access_token(&self, token: &str) -> Result<Claims, AppError> {
        self.issuer.validate_access_token(token, self.clock.now())
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<User, AppError> {
        self.credentials
            .find_user_by_id(user_id)
            .await?
            .ok_or(AppError::Auth(AuthError::UserNotFound))
    }

    /// Lifetime of refresh tokens, for transport (cookie max-age)
    pub fn refresh_token_ttl(&self) -> Duration {
        self.issuer.refresh_token_ttl()
    }
}

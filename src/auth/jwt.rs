/// Token Issuer
///
/// Mints and decodes HS256-signed access and refresh tokens. Pure apart from
/// the signing key, which is loaded once from configuration. Expiry is
/// checked against the caller's clock reading, not the system time.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenUse};
use crate::configuration::JwtSettings;
use crate::domain::User;
use crate::error::{AppError, AuthError, ConfigError};

/// A signed access token and its lifetime in seconds
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_in: i64,
}

/// Identity carried by a verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(settings: &JwtSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            issuer: settings.issuer.clone(),
            access_ttl: Duration::seconds(settings.access_token_expiry),
            refresh_ttl: Duration::seconds(settings.refresh_token_expiry),
        })
    }

    pub fn issue_access_token(&self, user: &User, now: DateTime<Utc>) -> Result<AccessToken, AppError> {
        let token = self.sign(user, TokenUse::Access, now, self.access_ttl)?;
        Ok(AccessToken {
            token,
            expires_in: self.access_token_ttl(),
        })
    }

    pub fn issue_refresh_token(&self, user: &User, now: DateTime<Utc>) -> Result<String, AppError> {
        self.sign(user, TokenUse::Refresh, now, self.refresh_ttl)
    }

    /// Decode a refresh token and return the identity it is bound to.
    ///
    /// # Errors
    /// - `InvalidToken`: bad signature or foreign issuer
    /// - `ExpiredToken`: past the embedded expiry
    /// - `MalformedToken`: not a JWT, or not a refresh token
    pub fn extract_identity(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, AppError> {
        let claims = self.decode_claims(token, TokenUse::Refresh, now)?;
        Ok(Identity {
            user_id: claims.user_id()?,
            email: claims.email,
        })
    }

    /// Same checks as `extract_identity`, for bearer access tokens
    pub fn validate_access_token(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AppError> {
        self.decode_claims(token, TokenUse::Access, now)
    }

    /// Access token lifetime in seconds, as reported to clients
    pub fn access_token_ttl(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn sign(
        &self,
        user: &User,
        token_use: TokenUse,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<String, AppError> {
        let claims = Claims::new(user.id, &user.email, token_use, now, ttl, &self.issuer);
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "JWT encoding failed");
            AppError::Auth(AuthError::SigningError)
        })
    }

    fn decode_claims(
        &self,
        token: &str,
        expected: TokenUse,
        now: DateTime<Utc>,
    ) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // expiry is checked below against the injected clock
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "JWT validation error");
                AppError::Auth(classify(e.kind()))
            })?;

        if claims.token_use != expected {
            return Err(AppError::Auth(AuthError::MalformedToken));
        }
        if claims.is_expired_at(now) {
            return Err(AppError::Auth(AuthError::ExpiredToken));
        }
        Ok(claims)
    }
}

fn classify(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::ImmatureSignature => AuthError::InvalidToken,
        ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
        _ => AuthError::MalformedToken,
    }
}

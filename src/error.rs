/// Error Handling Module
///
/// Every failure in the service is one of a small set of domain error
/// enums, folded into `AppError` for `?` propagation. The HTTP layer maps
/// each variant to a status and a stable `code` the client can branch on;
/// storage and signing details never reach the response body.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for input data (rejected before touching any store)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
    SuspiciousContent(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::SuspiciousContent(field) => {
                write!(f, "{} contains suspicious content", field)
            }
        }
    }
}

impl StdError for ValidationError {}

/// Database operation errors
#[derive(Debug)]
pub enum DatabaseError {
    UniqueConstraintViolation(String),
    NotFound(String),
    ConnectionPool(String),
    UnexpectedError(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::UniqueConstraintViolation(msg) => {
                write!(f, "Duplicate entry: {}", msg)
            }
            DatabaseError::NotFound(msg) => write!(f, "Not found: {}", msg),
            DatabaseError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::UnexpectedError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

/// Notification delivery errors
#[derive(Debug, Clone)]
pub enum EmailError {
    SendFailed(String),
    InvalidRecipient(String),
}

impl fmt::Display for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailError::SendFailed(msg) => write!(f, "Failed to send email: {}", msg),
            EmailError::InvalidRecipient(msg) => write!(f, "Invalid recipient: {}", msg),
        }
    }
}

impl StdError for EmailError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Config parse error: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// Authentication, verification and token lifecycle errors.
///
/// `ExpiredToken` is a signature-level expiry reported while decoding a JWT;
/// `TokenExpired` is the ledger record being past its stored expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    EmailAlreadyExists,
    UserNotFound,
    UserNotVerified,
    BadCredentials,
    AlreadyVerified,
    InvalidCode,
    CodeExpired,
    InvalidToken,
    MalformedToken,
    ExpiredToken,
    UnknownToken,
    TokenExpired,
    TokenReused,
    SigningError,
    MissingToken,
}

impl AuthError {
    /// Stable, machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::EmailAlreadyExists => "EMAIL_ALREADY_EXISTS",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::UserNotVerified => "USER_NOT_VERIFIED",
            AuthError::BadCredentials => "BAD_CREDENTIALS",
            AuthError::AlreadyVerified => "ALREADY_VERIFIED",
            AuthError::InvalidCode => "INVALID_CODE",
            AuthError::CodeExpired => "CODE_EXPIRED",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::MalformedToken => "MALFORMED_TOKEN",
            AuthError::ExpiredToken => "EXPIRED_TOKEN",
            AuthError::UnknownToken => "UNKNOWN_TOKEN",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenReused => "TOKEN_REUSED",
            AuthError::SigningError => "SIGNING_ERROR",
            AuthError::MissingToken => "MISSING_TOKEN",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::EmailAlreadyExists | AuthError::AlreadyVerified => StatusCode::CONFLICT,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::UserNotVerified => StatusCode::FORBIDDEN,
            AuthError::InvalidCode | AuthError::CodeExpired => StatusCode::BAD_REQUEST,
            AuthError::SigningError => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::BadCredentials
            | AuthError::InvalidToken
            | AuthError::MalformedToken
            | AuthError::ExpiredToken
            | AuthError::UnknownToken
            | AuthError::TokenExpired
            | AuthError::TokenReused
            | AuthError::MissingToken => StatusCode::UNAUTHORIZED,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::EmailAlreadyExists => write!(f, "Email is already registered"),
            AuthError::UserNotFound => write!(f, "User not found"),
            AuthError::UserNotVerified => {
                write!(f, "Account not verified. Please verify your account")
            }
            AuthError::BadCredentials => write!(f, "Invalid email or password"),
            AuthError::AlreadyVerified => write!(f, "Account is already verified"),
            AuthError::InvalidCode => write!(f, "Invalid verification code"),
            AuthError::CodeExpired => write!(f, "Verification code has expired"),
            AuthError::InvalidToken => write!(f, "Invalid token"),
            AuthError::MalformedToken => write!(f, "Malformed token"),
            AuthError::ExpiredToken => write!(f, "Token signature has expired"),
            AuthError::UnknownToken => write!(f, "Refresh token not recognised"),
            AuthError::TokenExpired => write!(f, "Refresh token expired"),
            AuthError::TokenReused => {
                write!(f, "Refresh token was revoked. Please login again")
            }
            AuthError::SigningError => write!(f, "Token could not be signed"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
        }
    }
}

impl StdError for AuthError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Database(DatabaseError),
    Email(EmailError),
    Auth(AuthError),
    Config(ConfigError),
    Internal(String),
}

impl AppError {
    /// The auth error kind, if this is one
    pub fn auth_kind(&self) -> Option<AuthError> {
        match self {
            AppError::Auth(e) => Some(*e),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Email(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<EmailError> for AppError {
    fn from(err: EmailError) -> Self {
        AppError::Email(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(ConfigError::ParseError(err.to_string()))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => {
                AppError::Database(DatabaseError::NotFound("Record not found".to_string()))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Database(DatabaseError::ConnectionPool(err.to_string()))
            }
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                AppError::Database(DatabaseError::UniqueConstraintViolation(
                    db_err.message().to_string(),
                ))
            }
            _ => AppError::Database(DatabaseError::UnexpectedError(err.to_string())),
        }
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for correlating with server logs
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl AppError {
    /// Stable code plus a message that is safe to show to clients
    fn public_parts(&self) -> (&'static str, String) {
        match self {
            AppError::Validation(e) => ("VALIDATION_ERROR", e.to_string()),
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                ("DUPLICATE_ENTRY", "Duplicate entry".to_string())
            }
            AppError::Database(DatabaseError::NotFound(_)) => {
                ("NOT_FOUND", "Resource not found".to_string())
            }
            AppError::Database(DatabaseError::ConnectionPool(_)) => (
                "SERVICE_UNAVAILABLE",
                "Database service temporarily unavailable".to_string(),
            ),
            AppError::Database(_) => ("DATABASE_ERROR", "Database error occurred".to_string()),
            AppError::Email(_) => (
                "EMAIL_SERVICE_ERROR",
                "Email service temporarily unavailable".to_string(),
            ),
            AppError::Auth(e) => (e.code(), e.to_string()),
            AppError::Config(_) => ("CONFIG_ERROR", "Server configuration error".to_string()),
            AppError::Internal(_) => ("INTERNAL_ERROR", "Internal server error".to_string()),
        }
    }

    fn log(&self, error_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(error_id = error_id, error = %e, "Validation error");
            }
            AppError::Auth(e @ AuthError::TokenReused) => {
                tracing::warn!(error_id = error_id, error = %e, "Refresh token reuse rejected");
            }
            AppError::Auth(AuthError::SigningError) => {
                tracing::error!(error_id = error_id, error = %self, "Token signing failed");
            }
            AppError::Auth(e) => {
                tracing::info!(error_id = error_id, error = %e, "Authentication error");
            }
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                tracing::warn!(error_id = error_id, error = %self, "Duplicate entry attempt");
            }
            _ => {
                tracing::error!(error_id = error_id, error = %self, "Request failed");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let error_id = uuid::Uuid::new_v4().to_string();
        self.log(&error_id);

        let status = self.status_code();
        let (code, message) = self.public_parts();
        HttpResponse::build(status).json(ErrorResponse::new(
            error_id,
            message,
            code.to_string(),
            status.as_u16(),
        ))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => StatusCode::CONFLICT,
                DatabaseError::NotFound(_) => StatusCode::NOT_FOUND,
                DatabaseError::ConnectionPool(_) => StatusCode::SERVICE_UNAVAILABLE,
                DatabaseError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Email(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Auth(e) => e.status_code(),
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::EmptyField("email".to_string());
        assert_eq!(err.to_string(), "email is empty");
    }

    #[test]
    fn test_auth_error_conversion() {
        let app_err: AppError = AuthError::TokenReused.into();
        assert_eq!(app_err.auth_kind(), Some(AuthError::TokenReused));
    }

    #[test]
    fn test_token_errors_are_unauthorized() {
        for kind in [
            AuthError::InvalidToken,
            AuthError::UnknownToken,
            AuthError::TokenExpired,
            AuthError::TokenReused,
        ] {
            assert_eq!(AppError::Auth(kind).status_code(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_state_conflicts_map_to_409() {
        assert_eq!(
            AppError::Auth(AuthError::EmailAlreadyExists).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Auth(AuthError::AlreadyVerified).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_storage_details_do_not_leak() {
        let err = AppError::Database(DatabaseError::UnexpectedError(
            "relation \"refresh_tokens\" does not exist".to_string(),
        ));
        let (code, message) = err.public_parts();
        assert_eq!(code, "DATABASE_ERROR");
        assert!(!message.contains("refresh_tokens"));
    }

    #[test]
    fn test_error_response_creation() {
        let response = ErrorResponse::new(
            "test-123".to_string(),
            "Test error".to_string(),
            "TEST_ERROR".to_string(),
            400,
        );

        assert_eq!(response.error_id, "test-123");
        assert_eq!(response.code, "TEST_ERROR");
        assert_eq!(response.status, 400);
    }
}

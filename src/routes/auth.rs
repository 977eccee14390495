/// Authentication Routes
///
/// Thin adapters from HTTP to `AuthService`. The refresh token travels only
/// in an HttpOnly, SameSite=Strict cookie scoped to `/`; the access token is
/// returned in the body for bearer use.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Claims;
use crate::domain::{Role, User};
use crate::error::{AppError, AuthError};
use crate::services::{AuthService, Registration, TokenPair};

pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Transport settings for the refresh token cookie
#[derive(Debug, Clone, Copy)]
pub struct CookiePolicy {
    pub secure: bool,
}

#[derive(Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub username: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

#[derive(Deserialize)]
pub struct ResendQuery {
    pub email: String,
}

/// Body fallback for clients that cannot send cookies
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Login/refresh body. The refresh token itself is only in the cookie.
#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email,
            username: user.username,
            role: user.role,
            active: user.is_active,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

/// POST /auth/signup
///
/// # Errors
/// - 400: validation errors
/// - 409: `EMAIL_ALREADY_EXISTS`
pub async fn signup(
    form: web::Json<SignupRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let user = auth
        .signup(Registration {
            email: form.email,
            password: form.password,
            username: form.username,
        })
        .await?;

    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

/// POST /auth/login
///
/// # Errors
/// - 401: `BAD_CREDENTIALS`
/// - 403: `USER_NOT_VERIFIED`
/// - 404: `USER_NOT_FOUND`
pub async fn login(
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
    policy: web::Data<CookiePolicy>,
) -> Result<HttpResponse, AppError> {
    let pair = auth.login(&form.email, &form.password).await?;
    Ok(session_response(pair, &auth, &policy))
}

/// POST /auth/verify
pub async fn verify(
    form: web::Json<VerifyRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.verify(&form.email, &form.code).await?;
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Account verified successfully",
    }))
}

/// POST /auth/resend?email=...
pub async fn resend(
    query: web::Query<ResendQuery>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.resend(&query.email).await?;
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Verification code sent",
    }))
}

/// POST /auth/refresh-token
///
/// Reads the refresh token cookie (or a JSON body), rotates it, and sets the
/// replacement cookie.
///
/// # Errors
/// 401 with `INVALID_TOKEN`, `UNKNOWN_TOKEN`, `TOKEN_EXPIRED`, `TOKEN_REUSED`
/// or `MISSING_TOKEN`
pub async fn refresh(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    auth: web::Data<AuthService>,
    policy: web::Data<CookiePolicy>,
) -> Result<HttpResponse, AppError> {
    let token = presented_refresh_token(&req, body)?;
    let pair = auth.refresh(&token).await?;
    Ok(session_response(pair, &auth, &policy))
}

/// POST /auth/logout
///
/// Revokes every session of the token's owner and clears the cookie.
pub async fn logout(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    auth: web::Data<AuthService>,
    policy: web::Data<CookiePolicy>,
) -> Result<HttpResponse, AppError> {
    let token = presented_refresh_token(&req, body)?;
    auth.logout(&token).await?;

    let mut cookie = refresh_cookie(String::new(), 0, &policy);
    cookie.make_removal();
    Ok(HttpResponse::NoContent().cookie(cookie).finish())
}

/// GET /api/me (behind `JwtMiddleware`)
pub async fn current_user(
    claims: web::ReqData<Claims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user = auth.current_user(claims.user_id()?).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

fn presented_refresh_token(
    req: &HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
) -> Result<String, AppError> {
    req.cookie(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.map(|b| b.into_inner().refresh_token))
        .filter(|token| !token.trim().is_empty())
        .ok_or(AppError::Auth(AuthError::MissingToken))
}

fn session_response(pair: TokenPair, auth: &AuthService, policy: &CookiePolicy) -> HttpResponse {
    let max_age = auth.refresh_token_ttl().num_seconds();
    HttpResponse::Ok()
        .cookie(refresh_cookie(pair.refresh_token, max_age, policy))
        .json(LoginResponse {
            access_token: pair.access_token,
            token_type: "Bearer".to_string(),
            expires_in: pair.expires_in,
        })
}

fn refresh_cookie(value: String, max_age_seconds: i64, policy: &CookiePolicy) -> Cookie<'static> {
    Cookie::build(REFRESH_TOKEN_COOKIE, value)
        .http_only(true)
        .secure(policy.secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(CookieDuration::seconds(max_age_seconds))
        .finish()
}

mod auth;
mod health_check;

pub use auth::{
    current_user, login, logout, refresh, resend, signup, verify, CookiePolicy,
    REFRESH_TOKEN_COOKIE,
};
pub use health_check::health_check;

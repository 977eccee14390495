/// Authentication module
///
/// Token signing/decoding and password hashing.

mod claims;
mod jwt;
mod password;

pub use claims::{Claims, TokenUse};
pub use jwt::{AccessToken, Identity, TokenIssuer};
pub use password::{validate_password, BcryptHasher, PasswordHasher};

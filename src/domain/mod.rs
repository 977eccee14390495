/// Domain records shared by the services and the stores.

mod refresh_token;
mod user;
mod verification_token;

pub use refresh_token::{hash_token, RefreshTokenRecord, RefreshTokenState};
pub use user::{NewUser, Role, User};
pub use verification_token::{VerificationToken, CODE_LENGTH};

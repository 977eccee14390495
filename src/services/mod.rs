/// Core services: verification workflow, token rotation and the
/// authentication facade built from them.

mod authentication;
mod rotation;
mod verification;

pub use authentication::{AuthService, Registration};
pub use rotation::{RotationEngine, TokenPair};
pub use verification::VerificationWorkflow;

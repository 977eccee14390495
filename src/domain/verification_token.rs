use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use uuid::Uuid;

pub const CODE_LENGTH: usize = 6;

/// One-time numeric code proving control of a user's email address
#[derive(Clone, Debug)]
pub struct VerificationToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl VerificationToken {
    pub fn issue(user_id: Uuid, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            code: generate_code(),
            created_at: now,
            expires_at: now + ttl,
            used: false,
        }
    }

    /// Still valid at exactly `expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Uniform over 100000..=999999
fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999u32).to_string()
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "customer" => Ok(Role::Customer),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::Validation(ValidationError::InvalidFormat(format!(
                "role '{}'",
                other
            )))),
        }
    }
}

/// A registered account.
///
/// `is_active` stays false until the email address is verified.
/// The password hash is never serialised.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create a user; the store assigns nothing else
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

impl NewUser {
    pub fn into_user(self, created_at: DateTime<Utc>) -> User {
        User {
            id: Uuid::new_v4(),
            email: self.email,
            username: self.username,
            password_hash: self.password_hash,
            is_active: false,
            role: self.role,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_starts_inactive() {
        let user = NewUser {
            email: "a@example.com".to_string(),
            username: "a".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            role: Role::Customer,
        }
        .into_user(Utc::now());

        assert!(!user.is_active);
        assert_eq!(user.role, Role::Customer);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = NewUser {
            email: "a@example.com".to_string(),
            username: "a".to_string(),
            password_hash: "$2b$04$secret-hash".to_string(),
            role: Role::Customer,
        }
        .into_user(Utc::now());

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("secret-hash"));
    }

    #[test]
    fn test_role_round_trips_through_storage_name() {
        assert_eq!(Role::parse(Role::Admin.as_str()).unwrap(), Role::Admin);
        assert!(Role::parse("owner").is_err());
    }
}

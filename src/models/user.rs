//! User model - human principals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserState {
    Enabled,
    Disabled,
}

impl UserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserState::Enabled => "enabled",
            UserState::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "disabled" => UserState::Disabled,
            _ => UserState::Enabled,
        }
    }
}

/// User entity.
///
/// `email` and `name` are case-folded to lower at the service boundary
/// and, when non-empty, are unique across enabled users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub title: String,
    pub avatar: String,
    pub metadata: serde_json::Value,
    pub state: UserState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, name: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            title: String::new(),
            avatar: String::new(),
            metadata: serde_json::Value::Null,
            state: UserState::Enabled,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state == UserState::Enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        assert_eq!(UserState::parse("disabled"), UserState::Disabled);
        assert_eq!(UserState::parse("ENABLED"), UserState::Enabled);
        assert_eq!(UserState::Disabled.as_str(), "disabled");
    }

    #[test]
    fn test_new_user_is_enabled() {
        let user = User::new("a@example.com".into(), "a".into(), Utc::now());
        assert!(user.is_enabled());
    }
}

//! Session model - opaque bearer tokens bound to a user.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session entity. The id is the token; there is no refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub authenticated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl Session {
    pub fn new(user_id: Uuid, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            authenticated_at: now,
            created_at: now,
            expires_at: now + ttl,
            metadata: serde_json::Value::Null,
        }
    }

    /// A session is valid iff the row exists and has not expired.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_session_is_invalid_immediately() {
        let now = Utc::now();
        let session = Session::new(Uuid::new_v4(), Duration::hours(1), now);
        assert!(session.is_valid(now));
        assert!(!session.is_valid(now + Duration::hours(1)));
    }
}

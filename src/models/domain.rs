//! Domain model - organization-owned DNS domains for auto-join.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainState {
    Pending,
    Verified,
}

impl DomainState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainState::Pending => "pending",
            DomainState::Verified => "verified",
        }
    }
}

/// Domain ownership record.
///
/// Pending requests carry a TTL and are garbage-collected when expired;
/// a verified domain asserts that any user whose email ends in
/// `@<name>` is a member of `org_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub id: Uuid,
    pub org_id: String,
    pub name: String,
    pub token: String,
    pub state: DomainState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Domain {
    pub fn new(
        org_id: String,
        name: String,
        token: String,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            name,
            token,
            state: DomainState::Pending,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// DNS name the verification TXT record must be published under.
    pub fn challenge_name(&self) -> String {
        format!("_frontier-challenge.{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_domain_is_pending() {
        let now = Utc::now();
        let domain = Domain::new(
            "o1".into(),
            "example.com".into(),
            "tok".into(),
            Duration::days(7),
            now,
        );
        assert_eq!(domain.state, DomainState::Pending);
        assert_eq!(domain.challenge_name(), "_frontier-challenge.example.com");
        assert!(!domain.is_expired(now));
    }
}

//! Flow model - short-lived authentication-in-progress records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authentication method carried by a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    MailOtp,
    MailLink,
    Passkey,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::MailOtp => "mailotp",
            AuthMethod::MailLink => "maillink",
            AuthMethod::Passkey => "passkey",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mailotp" => Some(AuthMethod::MailOtp),
            "maillink" => Some(AuthMethod::MailLink),
            "passkey" => Some(AuthMethod::Passkey),
            _ => None,
        }
    }
}

/// Authentication flow entity.
///
/// Single-use: consumed on successful finish, purged on expiry by the
/// reaper. The nonce must match the stored value byte-for-byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: Uuid,
    pub method: AuthMethod,
    pub email: String,
    pub nonce: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Flow {
    pub fn new(
        method: AuthMethod,
        email: String,
        nonce: String,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            email,
            nonce,
            metadata: serde_json::Value::Null,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_roundtrip() {
        assert_eq!(AuthMethod::parse("mailotp"), Some(AuthMethod::MailOtp));
        assert_eq!(AuthMethod::parse("MAILLINK"), Some(AuthMethod::MailLink));
        assert_eq!(AuthMethod::parse("password"), None);
        assert_eq!(AuthMethod::Passkey.as_str(), "passkey");
    }

    #[test]
    fn test_flow_expiry_is_bounded() {
        let now = Utc::now();
        let flow = Flow::new(
            AuthMethod::MailOtp,
            "a@example.com".into(),
            "123456".into(),
            Duration::minutes(10),
            now,
        );
        assert!(!flow.is_expired(now));
        assert!(flow.is_expired(now + Duration::minutes(10)));
    }
}

//! WebAuthn user data - a user's registered passkey credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webauthn_rs::prelude::Passkey;

/// Passkey credentials registered for one user, keyed by email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasskeyUserData {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub credentials: Vec<Passkey>,
    pub created_at: DateTime<Utc>,
}

impl PasskeyUserData {
    pub fn new(email: String, now: DateTime<Utc>) -> Self {
        let display_name = email
            .split('@')
            .next()
            .unwrap_or(email.as_str())
            .to_string();
        Self {
            id: Uuid::new_v4(),
            email,
            display_name,
            credentials: Vec::new(),
            created_at: now,
        }
    }
}

//! Service user model - non-human principals and their credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceUserState {
    Enabled,
    Disabled,
}

impl ServiceUserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceUserState::Enabled => "enabled",
            ServiceUserState::Disabled => "disabled",
        }
    }
}

/// Service user entity, owned by an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceUser {
    pub id: Uuid,
    pub org_id: String,
    pub title: String,
    pub state: ServiceUserState,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceUser {
    pub fn new(org_id: String, title: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            title,
            state: ServiceUserState::Enabled,
            metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state == ServiceUserState::Enabled
    }
}

/// Public key material stored for a key credential, JWK-shaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

impl Jwk {
    pub fn ed25519(kid: String, x: String) -> Self {
        Self {
            kty: "OKP".to_string(),
            kid,
            alg: Some("EdDSA".to_string()),
            crv: Some("Ed25519".to_string()),
            x: Some(x),
            n: None,
            e: None,
        }
    }

    pub fn rsa(kid: String, n: String, e: String) -> Self {
        Self {
            kty: "RSA".to_string(),
            kid,
            alg: Some("RS256".to_string()),
            crv: None,
            x: None,
            n: Some(n),
            e: Some(e),
        }
    }
}

/// A service-user credential.
///
/// Carries either a public key (JWT client assertion) or a hashed shared
/// secret, never both; the constructors are the only way to build one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceUserCredential {
    pub id: Uuid,
    pub service_user_id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<Jwk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_hash: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ServiceUserCredential {
    pub fn new_key(
        id: Uuid,
        service_user_id: Uuid,
        title: String,
        public_key: Jwk,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            service_user_id,
            title,
            public_key: Some(public_key),
            secret_hash: None,
            metadata: serde_json::Value::Null,
            created_at: now,
        }
    }

    pub fn new_secret(
        id: Uuid,
        service_user_id: Uuid,
        title: String,
        secret_hash: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            service_user_id,
            title,
            public_key: None,
            secret_hash: Some(secret_hash),
            metadata: serde_json::Value::Null,
            created_at: now,
        }
    }
}

//! Role model - named permission bundles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named bundle of permissions scoped to a namespace.
///
/// Permission names are resolved within `namespace`; granting the role
/// on a resource materializes one relation tuple per permission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub namespace: String,
    pub permissions: Vec<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(
        name: String,
        namespace: String,
        permissions: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            namespace,
            permissions,
            metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }
}

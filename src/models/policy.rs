//! Policy model - concrete role grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Object, Principal};

/// A concrete grant `(principal, role, resource)`.
///
/// Creating a policy materializes one relation tuple per permission in
/// the role; deleting it removes exactly those tuples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: Uuid,
    pub role_id: Uuid,
    pub principal: Principal,
    pub resource: Object,
    pub created_at: DateTime<Utc>,
}

impl Policy {
    pub fn new(role_id: Uuid, principal: Principal, resource: Object, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role_id,
            principal,
            resource,
            created_at: now,
        }
    }
}

/// Partial pattern for policy listing.
#[derive(Debug, Clone, Default)]
pub struct PolicyFilter {
    pub role_id: Option<Uuid>,
    pub principal_id: Option<String>,
    pub resource: Option<Object>,
}

impl PolicyFilter {
    pub fn matches(&self, policy: &Policy) -> bool {
        if let Some(role_id) = &self.role_id {
            if policy.role_id != *role_id {
                return false;
            }
        }
        if let Some(principal_id) = &self.principal_id {
            if policy.principal.id != *principal_id {
                return false;
            }
        }
        if let Some(resource) = &self.resource {
            if policy.resource != *resource {
                return false;
            }
        }
        true
    }
}

use serde::{Deserialize, Serialize};

use crate::schema::{SERVICE_USER_NAMESPACE, USER_NAMESPACE};

/// The canonical subject identity once authentication succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub namespace: String,
}

impl Principal {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            namespace: USER_NAMESPACE.to_string(),
        }
    }

    pub fn service_user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            namespace: SERVICE_USER_NAMESPACE.to_string(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.namespace == USER_NAMESPACE
    }

    pub fn is_service_user(&self) -> bool {
        self.namespace == SERVICE_USER_NAMESPACE
    }
}

//! Role service - named permission bundles.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::Role;
use crate::schema::SchemaRegistry;
use crate::store::{Clock, RoleStore};

pub struct RoleService {
    store: Arc<dyn RoleStore>,
    registry: Arc<SchemaRegistry>,
    clock: Arc<dyn Clock>,
}

impl RoleService {
    pub fn new(
        store: Arc<dyn RoleStore>,
        registry: Arc<SchemaRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
        }
    }

    /// Create a role. Every bundled permission must be declared in the
    /// role's namespace.
    pub async fn create(
        &self,
        name: &str,
        namespace: &str,
        permissions: Vec<String>,
    ) -> Result<Role, ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::InvalidArgument("empty role name".to_string()));
        }
        if permissions.is_empty() {
            return Err(ServiceError::InvalidArgument(format!(
                "role {:?} bundles no permissions",
                name
            )));
        }
        let schema = self.registry.snapshot();
        if schema.namespace(namespace).is_none() {
            return Err(ServiceError::InvalidArgument(format!(
                "unknown namespace {:?}",
                namespace
            )));
        }
        for permission in &permissions {
            if schema.permission(namespace, permission).is_none() {
                return Err(ServiceError::InvalidArgument(format!(
                    "unknown permission {:?} in namespace {:?}",
                    permission, namespace
                )));
            }
        }

        let role = Role::new(
            name.to_string(),
            namespace.to_string(),
            permissions,
            self.clock.now(),
        );
        self.store.insert(role).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Role, ServiceError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("role".to_string()))
    }

    pub async fn list(&self, namespace: Option<&str>) -> Result<Vec<Role>, ServiceError> {
        self.store.list(namespace).await
    }
}

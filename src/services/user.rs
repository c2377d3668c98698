//! User lifecycle service.
//!
//! Email and name are case-folded to lower at this boundary; the store
//! enforces their uniqueness across enabled users.

use std::sync::Arc;

use uuid::Uuid;
use validator::ValidateEmail;

use crate::engine::PermissionEngine;
use crate::error::ServiceError;
use crate::models::{Object, User, UserState};
use crate::schema::{MEMBERSHIP_PERMISSION, ORG_NAMESPACE, USER_NAMESPACE};
use crate::store::{Clock, UserStore};

pub struct UserService {
    store: Arc<dyn UserStore>,
    engine: Arc<PermissionEngine>,
    clock: Arc<dyn Clock>,
}

impl UserService {
    pub fn new(
        store: Arc<dyn UserStore>,
        engine: Arc<PermissionEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            engine,
            clock,
        }
    }

    pub async fn create(&self, email: &str, name: &str) -> Result<User, ServiceError> {
        let email = email.trim().to_lowercase();
        let name = name.trim().to_lowercase();
        if !email.validate_email() {
            return Err(ServiceError::InvalidArgument(format!(
                "invalid email address {:?}",
                email
            )));
        }
        let user = User::new(email, name, self.clock.now());
        let user = self.store.insert(user).await?;
        tracing::info!(user_id = %user.id, "user created");
        Ok(user)
    }

    /// Resolve a user by uuid, email or name.
    pub async fn get_by_id(&self, id: &str) -> Result<User, ServiceError> {
        if id.validate_email() {
            return self.get_by_email(id).await;
        }
        if let Ok(uuid) = Uuid::parse_str(id) {
            return self.get(uuid).await;
        }
        self.store
            .get_by_name(&id.to_lowercase())
            .await?
            .ok_or_else(|| ServiceError::NotFound("user".to_string()))
    }

    pub async fn get(&self, id: Uuid) -> Result<User, ServiceError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("user".to_string()))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<User, ServiceError> {
        self.store
            .get_by_email(&email.to_lowercase())
            .await?
            .ok_or_else(|| ServiceError::NotFound("user".to_string()))
    }

    /// Passwordless onboarding: look up by email, insert if absent.
    /// Returns whether the user was created by this call.
    pub async fn get_or_create_by_email(
        &self,
        email: &str,
    ) -> Result<(User, bool), ServiceError> {
        let email = email.trim().to_lowercase();
        if let Some(user) = self.store.get_by_email(&email).await? {
            return Ok((user, false));
        }

        let mut name = slug_from_email(&email);
        if self.store.get_by_name(&name).await?.is_some() {
            let mut suffix = [0u8; 3];
            rand::Rng::fill(&mut rand::thread_rng(), &mut suffix);
            name = format!("{}_{}", name, hex::encode(suffix));
        }
        let user = self.create(&email, &name).await?;
        Ok((user, true))
    }

    pub async fn enable(&self, id: Uuid) -> Result<(), ServiceError> {
        self.store.set_state(id, UserState::Enabled).await
    }

    pub async fn disable(&self, id: Uuid) -> Result<(), ServiceError> {
        self.store.set_state(id, UserState::Disabled).await
    }

    /// Members of an organization, resolved through the membership
    /// permission so transitive members (groups, verified domains) are
    /// included.
    pub async fn list_by_org(&self, org_id: &str) -> Result<Vec<User>, ServiceError> {
        let ids = self
            .engine
            .lookup_subjects(
                USER_NAMESPACE,
                &Object::new(ORG_NAMESPACE, org_id),
                MEMBERSHIP_PERMISSION,
            )
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.store.get_many(&ids).await
    }
}

fn slug_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    local
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_from_email() {
        assert_eq!(slug_from_email("alice@example.com"), "alice");
        assert_eq!(slug_from_email("a.b+c@example.com"), "a_b_c");
    }
}

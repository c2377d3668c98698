//! Policy service - materializes role grants into relation tuples.
//!
//! A policy and its tuples appear atomic to subsequent reads from the
//! same caller: tuple-insert failure compensates by deleting the policy
//! and every tuple already written. Deletes are idempotent and safe to
//! repeat.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{Object, Policy, PolicyFilter, Principal, Relation, RelationFilter, Subject};
use crate::store::{Clock, PolicyStore, RelationStore, RoleStore};

pub struct PolicyService {
    policies: Arc<dyn PolicyStore>,
    roles: Arc<dyn RoleStore>,
    relations: Arc<dyn RelationStore>,
    clock: Arc<dyn Clock>,
}

impl PolicyService {
    pub fn new(
        policies: Arc<dyn PolicyStore>,
        roles: Arc<dyn RoleStore>,
        relations: Arc<dyn RelationStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policies,
            roles,
            relations,
            clock,
        }
    }

    /// Grant `role_id` to `principal` on `resource`.
    ///
    /// Inserts the policy row and one relation tuple per permission in
    /// the role. A partial grant must not survive: any tuple failure
    /// removes the policy and the tuples already inserted.
    pub async fn create(
        &self,
        role_id: Uuid,
        principal: Principal,
        resource: Object,
    ) -> Result<Policy, ServiceError> {
        let role = self
            .roles
            .get(role_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("role".to_string()))?;
        if role.namespace != resource.namespace {
            return Err(ServiceError::InvalidArgument(format!(
                "role is scoped to namespace {:?}, resource is in {:?}",
                role.namespace, resource.namespace
            )));
        }

        let policy = Policy::new(role_id, principal, resource, self.clock.now());
        self.policies.insert(policy.clone()).await?;

        let subject = Subject::from(&policy.principal);
        let mut inserted: Vec<Relation> = Vec::new();
        for permission in &role.permissions {
            let tuple = Relation::new(policy.resource.clone(), permission.clone(), subject.clone());
            match self.relations.insert(tuple.clone()).await {
                Ok(_) => inserted.push(tuple),
                Err(err) => {
                    self.roll_back(&policy, &inserted).await;
                    return Err(err);
                }
            }
        }

        tracing::info!(
            policy_id = %policy.id,
            role = %role.name,
            tuples = role.permissions.len(),
            "policy created"
        );
        Ok(policy)
    }

    /// Remove a policy and all tuples it materialized. Repeating the
    /// call after a partial failure is safe; a missing policy is not an
    /// error. Every tuple-deletion failure is collected and reported.
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let Some(policy) = self.policies.get(id).await? else {
            return Ok(());
        };
        let role = self
            .roles
            .get(policy.role_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("role".to_string()))?;

        let subject = Subject::from(&policy.principal);
        let mut failures = Vec::new();
        for permission in &role.permissions {
            let filter = grant_filter(&policy.resource, permission, &subject);
            if let Err(err) = self.relations.delete(&filter).await {
                tracing::warn!(
                    policy_id = %policy.id,
                    permission = %permission,
                    error = %err,
                    "grant tuple removal failed"
                );
                failures.push(format!("{}: {}", permission, err));
            }
        }
        if !failures.is_empty() {
            return Err(ServiceError::Backend(anyhow::anyhow!(
                "failed to remove {} grant tuple(s): {}",
                failures.len(),
                failures.join("; ")
            )));
        }

        self.policies.delete(id).await?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Policy, ServiceError> {
        self.policies
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("policy".to_string()))
    }

    pub async fn list(&self, filter: &PolicyFilter) -> Result<Vec<Policy>, ServiceError> {
        self.policies.list(filter).await
    }

    async fn roll_back(&self, policy: &Policy, inserted: &[Relation]) {
        for tuple in inserted {
            let filter = grant_filter(&tuple.object, &tuple.relation, &tuple.subject);
            if let Err(err) = self.relations.delete(&filter).await {
                tracing::warn!(
                    policy_id = %policy.id,
                    relation = %tuple.relation,
                    error = %err,
                    "rollback left a residual tuple"
                );
            }
        }
        if let Err(err) = self.policies.delete(policy.id).await {
            tracing::warn!(policy_id = %policy.id, error = %err, "rollback left the policy row");
        }
    }
}

fn grant_filter(resource: &Object, permission: &str, subject: &Subject) -> RelationFilter {
    RelationFilter::object(resource.namespace.clone(), resource.id.clone())
        .with_relation(permission)
        .with_subject(subject)
}

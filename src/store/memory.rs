//! In-memory reference backends.
//!
//! Used by tests and by `db.url = "memory://"` deployments. Each store
//! is a map behind a `tokio::sync::RwLock`; uniqueness rules mirror the
//! unique indexes the relational adapter declares.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{
    Domain, DomainState, Flow, PasskeyUserData, Policy, PolicyFilter, Relation, RelationFilter,
    Role, ServiceUser, ServiceUserCredential, Session, User, UserState,
};
use crate::schema::SchemaRegistry;
use crate::store::{
    DomainFilter, DomainStore, FlowStore, PasskeyStore, PolicyStore, RelationStore, RoleStore,
    ServiceUserStore, SessionStore, UserStore,
};

pub struct MemoryRelationStore {
    registry: Arc<SchemaRegistry>,
    rows: RwLock<Vec<Relation>>,
}

impl MemoryRelationStore {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            rows: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RelationStore for MemoryRelationStore {
    async fn insert(&self, relation: Relation) -> Result<Relation, ServiceError> {
        let schema = self.registry.snapshot();
        if !schema.relation_exists(&relation.object.namespace, &relation.relation) {
            return Err(ServiceError::InvalidArgument(format!(
                "unknown relation {:?} in namespace {:?}",
                relation.relation, relation.object.namespace
            )));
        }
        if !schema.subject_allowed(
            &relation.object.namespace,
            &relation.relation,
            &relation.subject,
        ) {
            return Err(ServiceError::InvalidArgument(format!(
                "subject namespace {:?} is not permitted on relation {:?} of {:?}",
                relation.subject.namespace, relation.relation, relation.object.namespace
            )));
        }

        let mut rows = self.rows.write().await;
        if !rows.contains(&relation) {
            rows.push(relation.clone());
        }
        Ok(relation)
    }

    async fn delete(&self, filter: &RelationFilter) -> Result<u64, ServiceError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|row| !filter.matches(row));
        Ok((before - rows.len()) as u64)
    }

    async fn list(&self, filter: &RelationFilter) -> Result<Vec<Relation>, ServiceError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().filter(|row| filter.matches(row)).cloned().collect())
    }

    async fn list_object_ids(&self, namespace: &str) -> Result<Vec<String>, ServiceError> {
        let rows = self.rows.read().await;
        let mut ids: Vec<String> = rows
            .iter()
            .filter(|row| row.object.namespace == namespace)
            .map(|row| row.object.id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn list_subject_ids(&self, namespace: &str) -> Result<Vec<String>, ServiceError> {
        let rows = self.rows.read().await;
        let mut ids: Vec<String> = rows
            .iter()
            .filter(|row| row.subject.namespace == namespace)
            .map(|row| row.subject.id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

pub struct MemoryPolicyStore {
    rows: RwLock<HashMap<Uuid, Policy>>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn insert(&self, policy: Policy) -> Result<Policy, ServiceError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&policy.id) {
            return Err(ServiceError::AlreadyExists("policy".to_string()));
        }
        rows.insert(policy.id, policy.clone());
        Ok(policy)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Policy>, ServiceError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }

    async fn list(&self, filter: &PolicyFilter) -> Result<Vec<Policy>, ServiceError> {
        let rows = self.rows.read().await;
        Ok(rows.values().filter(|p| filter.matches(p)).cloned().collect())
    }
}

pub struct MemoryRoleStore {
    rows: RwLock<HashMap<Uuid, Role>>,
}

impl MemoryRoleStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryRoleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn insert(&self, role: Role) -> Result<Role, ServiceError> {
        let mut rows = self.rows.write().await;
        if rows
            .values()
            .any(|r| r.namespace == role.namespace && r.name == role.name)
        {
            return Err(ServiceError::AlreadyExists(format!(
                "role {:?} in namespace {:?}",
                role.name, role.namespace
            )));
        }
        rows.insert(role.id, role.clone());
        Ok(role)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Role>, ServiceError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn get_by_name(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Role>, ServiceError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|r| r.namespace == namespace && r.name == name)
            .cloned())
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<Role>, ServiceError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|r| namespace.map_or(true, |ns| r.namespace == ns))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }
}

pub struct MemoryUserStore {
    rows: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: User) -> Result<User, ServiceError> {
        let mut rows = self.rows.write().await;
        let email = user.email.to_lowercase();
        let name = user.name.to_lowercase();
        for existing in rows.values().filter(|u| u.is_enabled()) {
            if !email.is_empty() && existing.email.to_lowercase() == email {
                return Err(ServiceError::AlreadyExists(format!(
                    "user with email {:?}",
                    user.email
                )));
            }
            if !name.is_empty() && existing.name.to_lowercase() == name {
                return Err(ServiceError::AlreadyExists(format!(
                    "user with name {:?}",
                    user.name
                )));
            }
        }
        rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let email = email.to_lowercase();
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .cloned())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<User>, ServiceError> {
        let name = name.to_lowercase();
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|u| u.name.to_lowercase() == name)
            .cloned())
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<User>, ServiceError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|u| ids.contains(&u.id.to_string()))
            .cloned()
            .collect())
    }

    async fn set_state(&self, id: Uuid, state: UserState) -> Result<(), ServiceError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(user) => {
                user.state = state;
                user.updated_at = Utc::now();
                Ok(())
            }
            None => Err(ServiceError::NotFound("user".to_string())),
        }
    }
}

pub struct MemoryServiceUserStore {
    rows: RwLock<HashMap<Uuid, ServiceUser>>,
    credentials: RwLock<HashMap<Uuid, ServiceUserCredential>>,
}

impl MemoryServiceUserStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            credentials: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryServiceUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceUserStore for MemoryServiceUserStore {
    async fn insert(&self, service_user: ServiceUser) -> Result<ServiceUser, ServiceError> {
        self.rows
            .write()
            .await
            .insert(service_user.id, service_user.clone());
        Ok(service_user)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ServiceUser>, ServiceError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn list_by_org(&self, org_id: &str) -> Result<Vec<ServiceUser>, ServiceError> {
        let rows = self.rows.read().await;
        Ok(rows.values().filter(|s| s.org_id == org_id).cloned().collect())
    }

    async fn insert_credential(
        &self,
        credential: ServiceUserCredential,
    ) -> Result<ServiceUserCredential, ServiceError> {
        self.credentials
            .write()
            .await
            .insert(credential.id, credential.clone());
        Ok(credential)
    }

    async fn get_credential(
        &self,
        id: Uuid,
    ) -> Result<Option<ServiceUserCredential>, ServiceError> {
        Ok(self.credentials.read().await.get(&id).cloned())
    }

    async fn list_credentials(
        &self,
        service_user_id: Uuid,
    ) -> Result<Vec<ServiceUserCredential>, ServiceError> {
        let credentials = self.credentials.read().await;
        Ok(credentials
            .values()
            .filter(|c| c.service_user_id == service_user_id)
            .cloned()
            .collect())
    }

    async fn delete_credential(&self, id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.credentials.write().await.remove(&id).is_some())
    }
}

pub struct MemoryFlowStore {
    rows: RwLock<HashMap<Uuid, Flow>>,
}

impl MemoryFlowStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryFlowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlowStore for MemoryFlowStore {
    async fn insert(&self, flow: Flow) -> Result<Flow, ServiceError> {
        self.rows.write().await.insert(flow.id, flow.clone());
        Ok(flow)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Flow>, ServiceError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, flow| !flow.is_expired(now));
        Ok((before - rows.len()) as u64)
    }
}

pub struct MemorySessionStore {
    rows: RwLock<HashMap<Uuid, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: Session) -> Result<Session, ServiceError> {
        self.rows.write().await.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>, ServiceError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, session| session.is_valid(now));
        Ok((before - rows.len()) as u64)
    }
}

pub struct MemoryDomainStore {
    rows: RwLock<HashMap<Uuid, Domain>>,
}

impl MemoryDomainStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryDomainStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DomainStore for MemoryDomainStore {
    async fn insert(&self, domain: Domain) -> Result<Domain, ServiceError> {
        let mut rows = self.rows.write().await;
        if rows
            .values()
            .any(|d| d.org_id == domain.org_id && d.name == domain.name)
        {
            return Err(ServiceError::AlreadyExists(format!(
                "domain {:?}",
                domain.name
            )));
        }
        rows.insert(domain.id, domain.clone());
        Ok(domain)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Domain>, ServiceError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn update(&self, domain: Domain) -> Result<Domain, ServiceError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&domain.id) {
            Some(existing) => {
                *existing = domain.clone();
                Ok(domain)
            }
            None => Err(ServiceError::NotFound("domain".to_string())),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }

    async fn list(&self, filter: &DomainFilter) -> Result<Vec<Domain>, ServiceError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|d| {
                filter.org_id.as_ref().map_or(true, |org| d.org_id == *org)
                    && filter.name.as_ref().map_or(true, |name| d.name == *name)
                    && filter.state.map_or(true, |state| d.state == state)
            })
            .cloned()
            .collect())
    }

    async fn delete_expired_pending(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, d| d.state == DomainState::Verified || !d.is_expired(now));
        Ok((before - rows.len()) as u64)
    }
}

pub struct MemoryPasskeyStore {
    rows: RwLock<HashMap<String, PasskeyUserData>>,
}

impl MemoryPasskeyStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryPasskeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PasskeyStore for MemoryPasskeyStore {
    async fn get_by_email(&self, email: &str) -> Result<Option<PasskeyUserData>, ServiceError> {
        Ok(self.rows.read().await.get(&email.to_lowercase()).cloned())
    }

    async fn upsert(&self, data: PasskeyUserData) -> Result<(), ServiceError> {
        self.rows
            .write()
            .await
            .insert(data.email.to_lowercase(), data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Object, Subject};
    use crate::schema::{base_schema, ORG_NAMESPACE, USER_NAMESPACE};
    use chrono::Duration;

    fn relation_store() -> MemoryRelationStore {
        let registry = Arc::new(SchemaRegistry::new(base_schema()).unwrap());
        MemoryRelationStore::new(registry)
    }

    #[tokio::test]
    async fn test_relation_insert_is_idempotent() {
        let store = relation_store();
        let tuple = Relation::new(
            Object::new(ORG_NAMESPACE, "o1"),
            "member",
            Subject::new(USER_NAMESPACE, "u1"),
        );
        store.insert(tuple.clone()).await.unwrap();
        store.insert(tuple.clone()).await.unwrap();
        let rows = store.list(&RelationFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_relation_insert_rejects_bad_subject() {
        let store = relation_store();
        let tuple = Relation::new(
            Object::new(ORG_NAMESPACE, "o1"),
            "member",
            Subject::new(ORG_NAMESPACE, "o2"),
        );
        let err = store.insert(tuple).await.unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[tokio::test]
    async fn test_user_email_unique_among_enabled() {
        let store = MemoryUserStore::new();
        let now = Utc::now();
        let first = User::new("a@example.com".into(), "a".into(), now);
        store.insert(first.clone()).await.unwrap();

        let dup = User::new("a@example.com".into(), "a2".into(), now);
        assert_eq!(store.insert(dup).await.unwrap_err().code(), "already_exists");

        // disabling the first frees the email
        store.set_state(first.id, UserState::Disabled).await.unwrap();
        let again = User::new("a@example.com".into(), "a3".into(), now);
        store.insert(again).await.unwrap();
    }

    #[tokio::test]
    async fn test_flow_delete_reports_consumption() {
        let store = MemoryFlowStore::new();
        let flow = Flow::new(
            crate::models::AuthMethod::MailOtp,
            "a@example.com".into(),
            "123456".into(),
            Duration::minutes(10),
            Utc::now(),
        );
        store.insert(flow.clone()).await.unwrap();
        assert!(store.delete(flow.id).await.unwrap());
        assert!(!store.delete(flow.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_pending_domains_are_reaped_verified_kept() {
        let store = MemoryDomainStore::new();
        let now = Utc::now();
        let pending = Domain::new(
            "o1".into(),
            "old.example.com".into(),
            "tok".into(),
            Duration::seconds(-1),
            now,
        );
        let mut verified = Domain::new(
            "o1".into(),
            "example.com".into(),
            "tok".into(),
            Duration::seconds(-1),
            now,
        );
        verified.state = DomainState::Verified;
        store.insert(pending).await.unwrap();
        store.insert(verified).await.unwrap();

        let removed = store.delete_expired_pending(now).await.unwrap();
        assert_eq!(removed, 1);
        let left = store.list(&DomainFilter::default()).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].state, DomainState::Verified);
    }
}

//! Storage ports.
//!
//! Every persistent collection is reached through a trait object so the
//! relational adapter (an external crate) can plug in behind the same
//! contracts the in-memory reference backends satisfy. Stores guarantee
//! read-your-writes within a single caller; no cross-caller ordering is
//! promised.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::DbConfig;
use crate::error::ServiceError;
use crate::models::{
    Domain, DomainState, Flow, PasskeyUserData, Policy, PolicyFilter, Relation, RelationFilter,
    Role, ServiceUser, ServiceUserCredential, Session, User, UserState,
};
use crate::schema::SchemaRegistry;

/// Time source port; lets tests pin "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Insert a tuple; idempotent on the full 6-tuple. The subject must
    /// conform to the relation definition.
    async fn insert(&self, relation: Relation) -> Result<Relation, ServiceError>;

    /// Delete every tuple matching the filter; returns the count.
    async fn delete(&self, filter: &RelationFilter) -> Result<u64, ServiceError>;

    async fn list(&self, filter: &RelationFilter) -> Result<Vec<Relation>, ServiceError>;

    /// Distinct object ids appearing in tuples of a namespace.
    async fn list_object_ids(&self, namespace: &str) -> Result<Vec<String>, ServiceError>;

    /// Distinct subject ids of a namespace appearing in any tuple.
    async fn list_subject_ids(&self, namespace: &str) -> Result<Vec<String>, ServiceError>;
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn insert(&self, policy: Policy) -> Result<Policy, ServiceError>;
    async fn get(&self, id: Uuid) -> Result<Option<Policy>, ServiceError>;
    async fn delete(&self, id: Uuid) -> Result<bool, ServiceError>;
    async fn list(&self, filter: &PolicyFilter) -> Result<Vec<Policy>, ServiceError>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn insert(&self, role: Role) -> Result<Role, ServiceError>;
    async fn get(&self, id: Uuid) -> Result<Option<Role>, ServiceError>;
    async fn get_by_name(&self, namespace: &str, name: &str)
        -> Result<Option<Role>, ServiceError>;
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<Role>, ServiceError>;
    async fn delete(&self, id: Uuid) -> Result<bool, ServiceError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user; email and name must be unique (case-folded)
    /// across enabled users.
    async fn insert(&self, user: User) -> Result<User, ServiceError>;
    async fn get(&self, id: Uuid) -> Result<Option<User>, ServiceError>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;
    async fn get_by_name(&self, name: &str) -> Result<Option<User>, ServiceError>;
    async fn get_many(&self, ids: &[String]) -> Result<Vec<User>, ServiceError>;
    async fn set_state(&self, id: Uuid, state: UserState) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait ServiceUserStore: Send + Sync {
    async fn insert(&self, service_user: ServiceUser) -> Result<ServiceUser, ServiceError>;
    async fn get(&self, id: Uuid) -> Result<Option<ServiceUser>, ServiceError>;
    async fn list_by_org(&self, org_id: &str) -> Result<Vec<ServiceUser>, ServiceError>;
    async fn insert_credential(
        &self,
        credential: ServiceUserCredential,
    ) -> Result<ServiceUserCredential, ServiceError>;
    async fn get_credential(
        &self,
        id: Uuid,
    ) -> Result<Option<ServiceUserCredential>, ServiceError>;
    async fn list_credentials(
        &self,
        service_user_id: Uuid,
    ) -> Result<Vec<ServiceUserCredential>, ServiceError>;
    async fn delete_credential(&self, id: Uuid) -> Result<bool, ServiceError>;
}

#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn insert(&self, flow: Flow) -> Result<Flow, ServiceError>;
    async fn get(&self, id: Uuid) -> Result<Option<Flow>, ServiceError>;
    /// Returns whether a row was deleted; consuming a flow twice is
    /// thereby observable.
    async fn delete(&self, id: Uuid) -> Result<bool, ServiceError>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, ServiceError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> Result<Session, ServiceError>;
    async fn get(&self, id: Uuid) -> Result<Option<Session>, ServiceError>;
    async fn delete(&self, id: Uuid) -> Result<bool, ServiceError>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, ServiceError>;
}

/// Filter for domain listing.
#[derive(Debug, Clone, Default)]
pub struct DomainFilter {
    pub org_id: Option<String>,
    pub name: Option<String>,
    pub state: Option<DomainState>,
}

#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn insert(&self, domain: Domain) -> Result<Domain, ServiceError>;
    async fn get(&self, id: Uuid) -> Result<Option<Domain>, ServiceError>;
    async fn update(&self, domain: Domain) -> Result<Domain, ServiceError>;
    async fn delete(&self, id: Uuid) -> Result<bool, ServiceError>;
    async fn list(&self, filter: &DomainFilter) -> Result<Vec<Domain>, ServiceError>;
    async fn delete_expired_pending(&self, now: DateTime<Utc>) -> Result<u64, ServiceError>;
}

#[async_trait]
pub trait PasskeyStore: Send + Sync {
    async fn get_by_email(&self, email: &str) -> Result<Option<PasskeyUserData>, ServiceError>;
    async fn upsert(&self, data: PasskeyUserData) -> Result<(), ServiceError>;
}

/// The full set of storage ports, wired once at startup.
#[derive(Clone)]
pub struct Stores {
    pub relations: Arc<dyn RelationStore>,
    pub policies: Arc<dyn PolicyStore>,
    pub roles: Arc<dyn RoleStore>,
    pub users: Arc<dyn UserStore>,
    pub service_users: Arc<dyn ServiceUserStore>,
    pub flows: Arc<dyn FlowStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub domains: Arc<dyn DomainStore>,
    pub passkeys: Arc<dyn PasskeyStore>,
}

/// Build the storage backends for the configured database url.
///
/// `memory://` selects the in-memory reference backends; relational
/// urls are served by the external database adapter crate.
pub fn connect(config: &DbConfig, registry: Arc<SchemaRegistry>) -> Result<Stores, ServiceError> {
    match config.url.as_str() {
        "memory://" => Ok(Stores {
            relations: Arc::new(memory::MemoryRelationStore::new(registry)),
            policies: Arc::new(memory::MemoryPolicyStore::new()),
            roles: Arc::new(memory::MemoryRoleStore::new()),
            users: Arc::new(memory::MemoryUserStore::new()),
            service_users: Arc::new(memory::MemoryServiceUserStore::new()),
            flows: Arc::new(memory::MemoryFlowStore::new()),
            sessions: Arc::new(memory::MemorySessionStore::new()),
            domains: Arc::new(memory::MemoryDomainStore::new()),
            passkeys: Arc::new(memory::MemoryPasskeyStore::new()),
        }),
        other => Err(ServiceError::InvalidArgument(format!(
            "unsupported database url {:?}: relational backends are provided \
             by the database adapter",
            other
        ))),
    }
}

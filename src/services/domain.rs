//! Domain verifier - organization-owned DNS domains and auto-join.
//!
//! Ownership is proven by publishing a TXT record under
//! `_frontier-challenge.<domain>`. Verified domains make every user
//! whose email ends in `@<domain>` a member of the owning organization.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{Domain, DomainState, Object, Relation, Subject, User};
use crate::schema::{MEMBER_RELATION, ORG_NAMESPACE, USER_NAMESPACE};
use crate::store::{Clock, DomainFilter, DomainStore, RelationStore};
use crate::utils::{constant_time_eq, generate_verification_token};

/// DNS TXT lookup port.
#[async_trait]
pub trait TxtResolver: Send + Sync {
    /// All TXT record values published under `name`; a missing record
    /// set is an empty result, not an error.
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, ServiceError>;
}

/// System resolver backed by hickory.
pub struct DnsTxtResolver {
    resolver: TokioAsyncResolver,
}

impl DnsTxtResolver {
    pub fn new() -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
        }
    }
}

impl Default for DnsTxtResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TxtResolver for DnsTxtResolver {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, ServiceError> {
        match self.resolver.txt_lookup(name.to_string()).await {
            Ok(lookup) => Ok(lookup.iter().map(|txt| txt.to_string()).collect()),
            Err(err) => match err.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Ok(Vec::new()),
                _ => Err(ServiceError::backend(err)),
            },
        }
    }
}

pub struct DomainService {
    store: Arc<dyn DomainStore>,
    relations: Arc<dyn RelationStore>,
    resolver: Arc<dyn TxtResolver>,
    clock: Arc<dyn Clock>,
    pending_ttl: Duration,
}

impl DomainService {
    pub fn new(
        store: Arc<dyn DomainStore>,
        relations: Arc<dyn RelationStore>,
        resolver: Arc<dyn TxtResolver>,
        clock: Arc<dyn Clock>,
        pending_ttl: Duration,
    ) -> Self {
        Self {
            store,
            relations,
            resolver,
            clock,
            pending_ttl,
        }
    }

    /// Register a domain for an organization. The returned record's
    /// token must be published under [`Domain::challenge_name`] before
    /// the pending request expires.
    pub async fn create(&self, org_id: &str, name: &str) -> Result<Domain, ServiceError> {
        let name = name.trim().to_lowercase();
        if name.is_empty() || !name.contains('.') || name.contains('@') || name.contains(char::is_whitespace) {
            return Err(ServiceError::InvalidArgument(format!(
                "invalid domain name {:?}",
                name
            )));
        }

        let domain = Domain::new(
            org_id.to_string(),
            name,
            generate_verification_token(),
            self.pending_ttl,
            self.clock.now(),
        );
        let domain = self.store.insert(domain).await?;
        tracing::info!(
            domain = %domain.name,
            org_id = %org_id,
            txt_record = %domain.challenge_name(),
            "domain verification started"
        );
        Ok(domain)
    }

    /// Resolve the challenge TXT record and advance to `verified` iff
    /// the token is present. Otherwise the domain stays pending and is
    /// returned unchanged.
    pub async fn verify(&self, id: Uuid) -> Result<Domain, ServiceError> {
        let mut domain = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("domain".to_string()))?;
        if domain.state == DomainState::Verified {
            return Ok(domain);
        }
        let now = self.clock.now();
        if domain.is_expired(now) {
            return Err(ServiceError::FailedPrecondition(
                "verification window has expired".to_string(),
            ));
        }

        let records = self.resolver.lookup_txt(&domain.challenge_name()).await?;
        let found = records
            .iter()
            .any(|record| constant_time_eq(record.trim(), &domain.token));
        if !found {
            tracing::info!(domain = %domain.name, "verification record not found, staying pending");
            return Ok(domain);
        }

        domain.state = DomainState::Verified;
        domain.updated_at = now;
        let domain = self.store.update(domain).await?;
        tracing::info!(domain = %domain.name, org_id = %domain.org_id, "domain verified");
        Ok(domain)
    }

    pub async fn get(&self, id: Uuid) -> Result<Domain, ServiceError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("domain".to_string()))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.store.delete(id).await?;
        Ok(())
    }

    pub async fn list_by_org(&self, org_id: &str) -> Result<Vec<Domain>, ServiceError> {
        self.store
            .list(&DomainFilter {
                org_id: Some(org_id.to_string()),
                ..Default::default()
            })
            .await
    }

    /// Auto-join: insert a member relation into every organization
    /// whose verified domain matches the user's email suffix. Returns
    /// the number of organizations joined.
    pub async fn join_orgs_for_email(&self, user: &User) -> Result<u64, ServiceError> {
        let Some((_, suffix)) = user.email.rsplit_once('@') else {
            return Ok(0);
        };
        let domains = self
            .store
            .list(&DomainFilter {
                name: Some(suffix.to_lowercase()),
                state: Some(DomainState::Verified),
                org_id: None,
            })
            .await?;

        let mut joined = 0;
        for domain in domains {
            self.relations
                .insert(Relation::new(
                    Object::new(ORG_NAMESPACE, domain.org_id.clone()),
                    MEMBER_RELATION,
                    Subject::new(USER_NAMESPACE, user.id.to_string()),
                ))
                .await?;
            tracing::info!(user_id = %user.id, org_id = %domain.org_id, "auto-joined organization");
            joined += 1;
        }
        Ok(joined)
    }
}

//! frontier-core
//!
//! Authorization core of an identity and access-management control
//! plane:
//! - a relation-based permission model with a schema registry and a
//!   policy compiler,
//! - passwordless authentication flows (OTP, magic link, passkeys) and
//!   service-user credentials (key pairs, hashed secrets),
//! - session lifecycle bound to authenticated principals,
//! - organization domain verification driving membership auto-join.
//!
//! Transport codecs and the relational database adapter are external
//! collaborators; they plug in behind the ports in [`store`] and
//! [`services`].

pub mod authn;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod schema;
pub mod services;
pub mod store;
pub mod utils;

use std::sync::Arc;

use webauthn_rs::prelude::Url;
use webauthn_rs::{Webauthn, WebauthnBuilder};

use crate::authn::AuthnService;
use crate::config::AppConfig;
use crate::engine::PermissionEngine;
use crate::error::ServiceError;
use crate::models::{Object, Relation, Subject};
use crate::schema::{SchemaRegistry, PLATFORM_ID, PLATFORM_NAMESPACE, SUPERUSER_RELATION, USER_NAMESPACE};
use crate::services::{
    CredentialService, DomainService, Mailer, PolicyService, Reaper, RoleService, SessionService,
    TxtResolver, UserService,
};
use crate::store::{Clock, Stores};

/// Externally supplied ports: the pieces tests and deployments swap.
pub struct Ports {
    pub clock: Arc<dyn Clock>,
    pub mailer: Arc<dyn Mailer>,
    pub resolver: Arc<dyn TxtResolver>,
}

/// All wired services. Cheap to clone; shared across request tasks.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SchemaRegistry>,
    pub stores: Stores,
    pub engine: Arc<PermissionEngine>,
    pub users: Arc<UserService>,
    pub roles: Arc<RoleService>,
    pub policies: Arc<PolicyService>,
    pub sessions: Arc<SessionService>,
    pub credentials: Arc<CredentialService>,
    pub domains: Arc<DomainService>,
    pub authn: Arc<AuthnService>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn build(
        config: &AppConfig,
        registry: Arc<SchemaRegistry>,
        ports: Ports,
    ) -> Result<Self, ServiceError> {
        let stores = store::connect(&config.db, registry.clone())?;
        let clock = ports.clock;

        let engine = Arc::new(PermissionEngine::new(
            registry.clone(),
            stores.relations.clone(),
        ));
        let users = Arc::new(UserService::new(
            stores.users.clone(),
            engine.clone(),
            clock.clone(),
        ));
        let roles = Arc::new(RoleService::new(
            stores.roles.clone(),
            registry.clone(),
            clock.clone(),
        ));
        let policies = Arc::new(PolicyService::new(
            stores.policies.clone(),
            stores.roles.clone(),
            stores.relations.clone(),
            clock.clone(),
        ));
        let sessions = Arc::new(SessionService::new(
            stores.sessions.clone(),
            stores.users.clone(),
            clock.clone(),
            config.session_ttl(),
        ));
        let credentials = Arc::new(CredentialService::new(
            stores.service_users.clone(),
            clock.clone(),
        ));
        let domains = Arc::new(DomainService::new(
            stores.domains.clone(),
            stores.relations.clone(),
            ports.resolver,
            clock.clone(),
            config.domain_pending_ttl(),
        ));
        let authn = Arc::new(AuthnService::new(
            stores.flows.clone(),
            users.clone(),
            stores.passkeys.clone(),
            domains.clone(),
            credentials.clone(),
            sessions.clone(),
            ports.mailer,
            build_webauthn(config)?,
            clock.clone(),
            &config.flow,
        ));

        Ok(Self {
            registry,
            stores,
            engine,
            users,
            roles,
            policies,
            sessions,
            credentials,
            domains,
            authn,
            clock,
        })
    }

    /// Build the background reaper over this state's stores.
    pub fn reaper(&self, config: &AppConfig) -> Reaper {
        Reaper::new(
            self.stores.flows.clone(),
            self.stores.sessions.clone(),
            self.stores.domains.clone(),
            self.clock.clone(),
            std::time::Duration::from_secs(config.session.reaper_interval_secs),
        )
    }
}

fn build_webauthn(config: &AppConfig) -> Result<Arc<Webauthn>, ServiceError> {
    let mut origins = config.passkey.origins.iter();
    let primary = origins
        .next()
        .ok_or_else(|| {
            ServiceError::InvalidArgument("passkey.origins must not be empty".to_string())
        })?;
    let primary = Url::parse(primary).map_err(|e| {
        ServiceError::InvalidArgument(format!("invalid passkey origin {:?}: {}", primary, e))
    })?;

    let mut builder = WebauthnBuilder::new(&config.passkey.rp_id, &primary)
        .map_err(|e| ServiceError::InvalidArgument(format!("invalid passkey config: {}", e)))?;
    for origin in origins {
        let origin = Url::parse(origin).map_err(|e| {
            ServiceError::InvalidArgument(format!("invalid passkey origin {:?}: {}", origin, e))
        })?;
        builder = builder.append_allowed_origin(&origin);
    }
    builder
        .build()
        .map(Arc::new)
        .map_err(|e| ServiceError::InvalidArgument(format!("invalid passkey config: {}", e)))
}

/// Ensure every bootstrap admin exists and holds the platform
/// superuser relation. Idempotent across restarts.
pub async fn bootstrap_admins(state: &AppState, admins: &[String]) -> Result<(), ServiceError> {
    for email in admins {
        let (user, _) = state.users.get_or_create_by_email(email).await?;
        state
            .stores
            .relations
            .insert(Relation::new(
                Object::new(PLATFORM_NAMESPACE, PLATFORM_ID),
                SUPERUSER_RELATION,
                Subject::new(USER_NAMESPACE, user.id.to_string()),
            ))
            .await?;
        tracing::info!(user_id = %user.id, "bootstrap admin granted platform superuser");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webauthn_builds_from_default_config() {
        let config = AppConfig::default();
        assert!(build_webauthn(&config).is_ok());
    }

    #[test]
    fn test_invalid_passkey_origin_is_rejected() {
        let mut config = AppConfig::default();
        config.passkey.origins = vec!["not a url".to_string()];
        let err = build_webauthn(&config).unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[test]
    fn test_empty_passkey_origins_are_rejected() {
        let mut config = AppConfig::default();
        config.passkey.origins = vec![];
        let err = build_webauthn(&config).unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }
}

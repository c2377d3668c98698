//! Authentication strategies and flow lifecycle.
//!
//! Every strategy is a two-step state machine: `start` serializes its
//! state into a bounded-lifetime [`Flow`] row, `finish` verifies the
//! caller's proof and yields a [`Principal`]. Service-user strategies
//! (JWT client assertion, shared secret) have no start step and are
//! reached through [`AuthnService::resolve_principal`].

pub mod magic_link;
pub mod otp;
pub mod passkey;

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;
use validator::ValidateEmail;
use webauthn_rs::Webauthn;

use crate::config::FlowConfig;
use crate::error::ServiceError;
use crate::models::{AuthMethod, Flow, Principal};
use crate::services::{CredentialService, DomainService, Mailer, SessionService, UserService};
use crate::store::{Clock, FlowStore, PasskeyStore};

/// Result of starting a flow. `options` carries the WebAuthn challenge
/// for passkey flows; mail flows deliver their secret out of band.
#[derive(Debug)]
pub struct AuthFlowStart {
    pub flow_id: Uuid,
    pub method: AuthMethod,
    pub options: Option<serde_json::Value>,
}

/// An inbound request credential.
#[derive(Debug, Clone)]
pub enum AuthToken {
    /// Session id from cookie or header.
    Session(Uuid),
    /// `Authorization: Bearer` value: either `credential-id:secret` or
    /// a signed service-user JWT.
    Bearer(String),
}

pub struct AuthnService {
    flows: Arc<dyn FlowStore>,
    users: Arc<UserService>,
    passkeys: Arc<dyn PasskeyStore>,
    domains: Arc<DomainService>,
    credentials: Arc<CredentialService>,
    sessions: Arc<SessionService>,
    mailer: Arc<dyn Mailer>,
    webauthn: Arc<Webauthn>,
    clock: Arc<dyn Clock>,
    otp_ttl: Duration,
    link_ttl: Duration,
    link_base_url: String,
}

impl AuthnService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        flows: Arc<dyn FlowStore>,
        users: Arc<UserService>,
        passkeys: Arc<dyn PasskeyStore>,
        domains: Arc<DomainService>,
        credentials: Arc<CredentialService>,
        sessions: Arc<SessionService>,
        mailer: Arc<dyn Mailer>,
        webauthn: Arc<Webauthn>,
        clock: Arc<dyn Clock>,
        config: &FlowConfig,
    ) -> Self {
        Self {
            flows,
            users,
            passkeys,
            domains,
            credentials,
            sessions,
            mailer,
            webauthn,
            clock,
            otp_ttl: Duration::seconds(config.otp_ttl_secs),
            link_ttl: Duration::seconds(config.link_ttl_secs),
            link_base_url: config.link_base_url.clone(),
        }
    }

    pub async fn start(
        &self,
        method: AuthMethod,
        email: &str,
    ) -> Result<AuthFlowStart, ServiceError> {
        let email = email.trim().to_lowercase();
        if !email.validate_email() {
            return Err(ServiceError::InvalidArgument(format!(
                "invalid email address {:?}",
                email
            )));
        }
        match method {
            AuthMethod::MailOtp => self.start_otp(&email).await,
            AuthMethod::MailLink => self.start_magic_link(&email).await,
            AuthMethod::Passkey => self.start_passkey(&email).await,
        }
    }

    pub async fn finish(
        &self,
        method: AuthMethod,
        flow_id: Uuid,
        code: &str,
    ) -> Result<Principal, ServiceError> {
        let flow = self
            .flows
            .get(flow_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("authentication flow".to_string()))?;
        if flow.method != method {
            return Err(ServiceError::InvalidArgument(
                "flow was started with a different method".to_string(),
            ));
        }
        if flow.is_expired(self.clock.now()) {
            return Err(ServiceError::Unauthenticated(
                "authentication flow has expired".to_string(),
            ));
        }

        match method {
            AuthMethod::MailOtp => self.finish_otp(flow, code).await,
            AuthMethod::MailLink => self.finish_magic_link(flow, code).await,
            AuthMethod::Passkey => self.finish_passkey(flow, code).await,
        }
    }

    /// Resolve exactly one principal from an inbound credential, or
    /// reject as unauthenticated.
    pub async fn resolve_principal(&self, token: &AuthToken) -> Result<Principal, ServiceError> {
        match token {
            AuthToken::Session(id) => {
                let session = self.sessions.validate(*id).await?;
                Ok(Principal::user(session.user_id.to_string()))
            }
            AuthToken::Bearer(value) => {
                if let Some((id, secret)) = value.split_once(':') {
                    let credential_id = Uuid::parse_str(id).map_err(|_| {
                        ServiceError::Unauthenticated("invalid client credentials".to_string())
                    })?;
                    self.credentials
                        .verify_client_secret(credential_id, secret)
                        .await
                } else {
                    self.credentials.verify_jwt(value).await
                }
            }
        }
    }

    /// Consume a flow; at most one finish can succeed per flow.
    pub(crate) async fn consume_flow(&self, flow: &Flow) -> Result<(), ServiceError> {
        if self.flows.delete(flow.id).await? {
            Ok(())
        } else {
            Err(ServiceError::Unauthenticated(
                "authentication flow already used".to_string(),
            ))
        }
    }

    /// Passwordless onboarding: look the user up by email, create on
    /// first authentication, then run domain auto-join for new users.
    pub(crate) async fn principal_for_email(
        &self,
        email: &str,
    ) -> Result<Principal, ServiceError> {
        let (user, created) = self.users.get_or_create_by_email(email).await?;
        if !user.is_enabled() {
            return Err(ServiceError::FailedPrecondition(
                "user is disabled".to_string(),
            ));
        }
        if created {
            self.domains.join_orgs_for_email(&user).await?;
        }
        Ok(Principal::user(user.id.to_string()))
    }
}

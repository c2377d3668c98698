//! Magic-link strategy: a one-time URL carrying the flow id and nonce.

use crate::authn::{AuthFlowStart, AuthnService};
use crate::error::ServiceError;
use crate::models::{AuthMethod, Flow, Principal};
use crate::utils::{constant_time_eq, generate_nonce};

impl AuthnService {
    pub(crate) async fn start_magic_link(
        &self,
        email: &str,
    ) -> Result<AuthFlowStart, ServiceError> {
        let nonce = generate_nonce();
        let flow = Flow::new(
            AuthMethod::MailLink,
            email.to_string(),
            nonce.clone(),
            self.link_ttl,
            self.clock.now(),
        );
        let flow = self.flows.insert(flow).await?;

        let link = format!(
            "{}?strategy=maillink&code={}&state={}",
            self.link_base_url, nonce, flow.id
        );
        self.mailer
            .send(email, "Your sign-in link", &link_body(&link))
            .await?;

        tracing::info!(flow_id = %flow.id, "magic link flow started");
        Ok(AuthFlowStart {
            flow_id: flow.id,
            method: AuthMethod::MailLink,
            options: None,
        })
    }

    pub(crate) async fn finish_magic_link(
        &self,
        flow: Flow,
        nonce: &str,
    ) -> Result<Principal, ServiceError> {
        if !constant_time_eq(nonce.trim(), &flow.nonce) {
            return Err(ServiceError::Unauthenticated(
                "invalid sign-in link".to_string(),
            ));
        }
        self.consume_flow(&flow).await?;
        self.principal_for_email(&flow.email).await
    }
}

fn link_body(link: &str) -> String {
    format!(
        "Follow this link to sign in:\n\n{}\n\nThe link can be used once. If you did not request it, you can ignore this message.",
        link
    )
}

//! Mail OTP strategy: a 6-digit code delivered out of band.

use crate::authn::{AuthFlowStart, AuthnService};
use crate::error::ServiceError;
use crate::models::{AuthMethod, Flow, Principal};
use crate::utils::{constant_time_eq, generate_otp};

impl AuthnService {
    pub(crate) async fn start_otp(&self, email: &str) -> Result<AuthFlowStart, ServiceError> {
        let code = generate_otp();
        let flow = Flow::new(
            AuthMethod::MailOtp,
            email.to_string(),
            code.clone(),
            self.otp_ttl,
            self.clock.now(),
        );
        let flow = self.flows.insert(flow).await?;

        self.mailer
            .send(email, "Your one-time code", &otp_body(&code))
            .await?;

        tracing::info!(flow_id = %flow.id, "otp flow started");
        Ok(AuthFlowStart {
            flow_id: flow.id,
            method: AuthMethod::MailOtp,
            options: None,
        })
    }

    pub(crate) async fn finish_otp(
        &self,
        flow: Flow,
        code: &str,
    ) -> Result<Principal, ServiceError> {
        if !constant_time_eq(code.trim(), &flow.nonce) {
            return Err(ServiceError::Unauthenticated(
                "incorrect one-time code".to_string(),
            ));
        }
        self.consume_flow(&flow).await?;
        self.principal_for_email(&flow.email).await
    }
}

fn otp_body(code: &str) -> String {
    format!(
        "Your one-time code is {}.\n\nIf you did not request this code, you can ignore this message.",
        code
    )
}

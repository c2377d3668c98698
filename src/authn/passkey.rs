//! Passkey strategy (WebAuthn).
//!
//! Start issues a registration challenge when the email has no stored
//! credentials, otherwise an authentication challenge. The library
//! state is serialized into the flow row between steps.

use serde::{Deserialize, Serialize};
use webauthn_rs::prelude::{
    PasskeyAuthentication, PasskeyRegistration, PublicKeyCredential, RegisterPublicKeyCredential,
};

use crate::authn::{AuthFlowStart, AuthnService};
use crate::error::ServiceError;
use crate::models::{AuthMethod, Flow, PasskeyUserData, Principal};
use crate::utils::generate_nonce;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
enum PasskeyFlowState {
    Register {
        user_data: PasskeyUserData,
        state: PasskeyRegistration,
    },
    Login {
        state: PasskeyAuthentication,
    },
}

impl AuthnService {
    pub(crate) async fn start_passkey(&self, email: &str) -> Result<AuthFlowStart, ServiceError> {
        let now = self.clock.now();
        let existing = self.passkeys.get_by_email(email).await?;

        let (options, state) = match existing {
            Some(data) if !data.credentials.is_empty() => {
                let (challenge, auth_state) = self
                    .webauthn
                    .start_passkey_authentication(&data.credentials)
                    .map_err(|e| {
                        ServiceError::Internal(anyhow::anyhow!("webauthn challenge failed: {}", e))
                    })?;
                (
                    serde_json::to_value(&challenge)
                        .map_err(|e| ServiceError::Internal(e.into()))?,
                    PasskeyFlowState::Login { state: auth_state },
                )
            }
            existing => {
                let data = match existing {
                    Some(data) => data,
                    None => PasskeyUserData::new(email.to_string(), now),
                };
                let (challenge, reg_state) = self
                    .webauthn
                    .start_passkey_registration(data.id, email, &data.display_name, None)
                    .map_err(|e| {
                        ServiceError::Internal(anyhow::anyhow!("webauthn challenge failed: {}", e))
                    })?;
                (
                    serde_json::to_value(&challenge)
                        .map_err(|e| ServiceError::Internal(e.into()))?,
                    PasskeyFlowState::Register {
                        user_data: data,
                        state: reg_state,
                    },
                )
            }
        };

        let mut flow = Flow::new(
            AuthMethod::Passkey,
            email.to_string(),
            generate_nonce(),
            self.link_ttl,
            now,
        );
        flow.metadata =
            serde_json::to_value(&state).map_err(|e| ServiceError::Internal(e.into()))?;
        let flow = self.flows.insert(flow).await?;

        tracing::info!(flow_id = %flow.id, "passkey flow started");
        Ok(AuthFlowStart {
            flow_id: flow.id,
            method: AuthMethod::Passkey,
            options: Some(options),
        })
    }

    pub(crate) async fn finish_passkey(
        &self,
        flow: Flow,
        client_response: &str,
    ) -> Result<Principal, ServiceError> {
        let state: PasskeyFlowState = serde_json::from_value(flow.metadata.clone())
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("corrupt flow state: {}", e)))?;

        match state {
            PasskeyFlowState::Register {
                mut user_data,
                state,
            } => {
                let credential: RegisterPublicKeyCredential = serde_json::from_str(client_response)
                    .map_err(|_| {
                        ServiceError::InvalidArgument(
                            "malformed attestation response".to_string(),
                        )
                    })?;
                let passkey = self
                    .webauthn
                    .finish_passkey_registration(&credential, &state)
                    .map_err(|_| {
                        ServiceError::Unauthenticated(
                            "attestation verification failed".to_string(),
                        )
                    })?;

                self.consume_flow(&flow).await?;
                user_data.credentials.push(passkey);
                self.passkeys.upsert(user_data).await?;
                tracing::info!(flow_id = %flow.id, "passkey registered");
                self.principal_for_email(&flow.email).await
            }
            PasskeyFlowState::Login { state } => {
                // the account must exist and be enabled before the
                // assertion is considered
                let user = match self.users.get_by_email(&flow.email).await {
                    Ok(user) => user,
                    Err(ServiceError::NotFound(_)) => {
                        return Err(ServiceError::Unauthenticated("unknown user".to_string()));
                    }
                    Err(err) => return Err(err),
                };
                if !user.is_enabled() {
                    return Err(ServiceError::FailedPrecondition(
                        "user is disabled".to_string(),
                    ));
                }

                let credential: PublicKeyCredential = serde_json::from_str(client_response)
                    .map_err(|_| {
                        ServiceError::InvalidArgument("malformed assertion response".to_string())
                    })?;
                self.webauthn
                    .finish_passkey_authentication(&credential, &state)
                    .map_err(|_| {
                        ServiceError::Unauthenticated("assertion verification failed".to_string())
                    })?;

                self.consume_flow(&flow).await?;
                Ok(Principal::user(user.id.to_string()))
            }
        }
    }
}

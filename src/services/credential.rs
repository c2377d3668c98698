//! Credential service - service-user identities, key pairs, hashed
//! secrets, and JWT verification.
//!
//! Key credentials store only the public half as a JWK whose `kid` is
//! the credential id; the private key leaves the service exactly once,
//! at creation. Secret credentials store only an argon2id hash.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Duration;
use ed25519_dalek::pkcs8::{spki::der::pem::LineEnding, EncodePrivateKey};
use ed25519_dalek::SigningKey;
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{Jwk, Principal, ServiceUser, ServiceUserCredential};
use crate::store::{Clock, ServiceUserStore};
use crate::utils::{
    generate_client_secret, hash_secret, verify_secret, CredentialSecret, SecretHash,
};

/// Registered claims of a service-user client assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceUserClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// A freshly created key credential. `private_key_pem` is returned to
/// the caller once and never stored.
#[derive(Debug)]
pub struct IssuedKeyCredential {
    pub credential: ServiceUserCredential,
    pub private_key_pem: String,
}

/// A freshly created secret credential. `secret` is returned to the
/// caller once and never stored.
pub struct IssuedSecretCredential {
    pub credential: ServiceUserCredential,
    pub secret: String,
}

pub struct CredentialService {
    store: Arc<dyn ServiceUserStore>,
    clock: Arc<dyn Clock>,
}

impl CredentialService {
    pub fn new(store: Arc<dyn ServiceUserStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create_service_user(
        &self,
        org_id: &str,
        title: &str,
    ) -> Result<ServiceUser, ServiceError> {
        let service_user =
            ServiceUser::new(org_id.to_string(), title.to_string(), self.clock.now());
        let service_user = self.store.insert(service_user).await?;
        tracing::info!(service_user_id = %service_user.id, org_id = %org_id, "service user created");
        Ok(service_user)
    }

    pub async fn get_service_user(&self, id: Uuid) -> Result<ServiceUser, ServiceError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("service user".to_string()))
    }

    pub async fn list_by_org(&self, org_id: &str) -> Result<Vec<ServiceUser>, ServiceError> {
        self.store.list_by_org(org_id).await
    }

    /// Generate an Ed25519 key pair for a service user. The public key
    /// is stored as a JWK under `kid` = credential id; the private key
    /// is returned once as PKCS#8 PEM.
    pub async fn create_key_credential(
        &self,
        service_user_id: Uuid,
        title: &str,
    ) -> Result<IssuedKeyCredential, ServiceError> {
        let service_user = self.require_enabled(service_user_id).await?;

        let id = Uuid::new_v4();
        let signing_key = SigningKey::generate(&mut OsRng);
        let private_key_pem = signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("key encoding failed: {}", e)))?
            .to_string();
        let x = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().as_bytes());

        let credential = ServiceUserCredential::new_key(
            id,
            service_user.id,
            title.to_string(),
            Jwk::ed25519(id.to_string(), x),
            self.clock.now(),
        );
        let credential = self.store.insert_credential(credential).await?;

        tracing::info!(credential_id = %credential.id, service_user_id = %service_user.id, "key credential created");
        Ok(IssuedKeyCredential {
            credential,
            private_key_pem,
        })
    }

    /// Generate a high-entropy shared secret for a service user. Only
    /// the argon2id hash is stored; the secret is returned once.
    pub async fn create_secret_credential(
        &self,
        service_user_id: Uuid,
        title: &str,
    ) -> Result<IssuedSecretCredential, ServiceError> {
        let service_user = self.require_enabled(service_user_id).await?;

        let secret = generate_client_secret();
        let hash = hash_secret(&CredentialSecret::new(secret.clone()))
            .map_err(ServiceError::Internal)?;

        let credential = ServiceUserCredential::new_secret(
            Uuid::new_v4(),
            service_user.id,
            title.to_string(),
            hash.into_string(),
            self.clock.now(),
        );
        let credential = self.store.insert_credential(credential).await?;

        tracing::info!(credential_id = %credential.id, service_user_id = %service_user.id, "secret credential created");
        Ok(IssuedSecretCredential { credential, secret })
    }

    pub async fn list_credentials(
        &self,
        service_user_id: Uuid,
    ) -> Result<Vec<ServiceUserCredential>, ServiceError> {
        self.store.list_credentials(service_user_id).await
    }

    /// Revoke a credential. Idempotent; tokens signed with the key (or
    /// secrets matching the hash) stop verifying immediately.
    pub async fn delete_credential(&self, id: Uuid) -> Result<(), ServiceError> {
        if self.store.delete_credential(id).await? {
            tracing::info!(credential_id = %id, "credential revoked");
        }
        Ok(())
    }

    /// Verify a service-user client assertion.
    ///
    /// The `kid` header must resolve to a live key credential of the
    /// claimed service user.
    pub async fn verify_jwt(&self, token: &str) -> Result<Principal, ServiceError> {
        let denied = |reason: &str| ServiceError::Unauthenticated(reason.to_string());

        let header = decode_header(token).map_err(|_| denied("malformed token"))?;
        let kid = header
            .kid
            .as_deref()
            .and_then(|kid| Uuid::parse_str(kid).ok())
            .ok_or_else(|| denied("token missing key id"))?;

        let credential = self
            .store
            .get_credential(kid)
            .await?
            .ok_or_else(|| denied("unknown signing key"))?;
        let jwk = credential
            .public_key
            .as_ref()
            .ok_or_else(|| denied("credential carries no public key"))?;

        let (key, algorithm) = decoding_key(jwk)?;
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<ServiceUserClaims>(token, &key, &validation)
            .map_err(|_| denied("invalid token"))?;
        let sub = Uuid::parse_str(&data.claims.sub).map_err(|_| denied("invalid subject claim"))?;
        if sub != credential.service_user_id {
            return Err(denied("subject does not own the signing key"));
        }

        let service_user = self.require_enabled(sub).await?;
        Ok(Principal::service_user(service_user.id.to_string()))
    }

    /// Verify a `(credential id, secret)` pair in constant time.
    pub async fn verify_client_secret(
        &self,
        credential_id: Uuid,
        secret: &str,
    ) -> Result<Principal, ServiceError> {
        let denied = || ServiceError::Unauthenticated("invalid client credentials".to_string());

        let credential = self
            .store
            .get_credential(credential_id)
            .await?
            .ok_or_else(denied)?;
        let hash = credential.secret_hash.as_ref().ok_or_else(denied)?;

        verify_secret(
            &CredentialSecret::new(secret.to_string()),
            &SecretHash::new(hash.clone()),
        )
        .map_err(|_| denied())?;

        let service_user = self.require_enabled(credential.service_user_id).await?;
        Ok(Principal::service_user(service_user.id.to_string()))
    }

    /// Sign a client assertion with a private key previously issued by
    /// [`CredentialService::create_key_credential`].
    pub fn sign_jwt(
        private_key_pem: &str,
        kid: &str,
        service_user_id: Uuid,
        ttl: Duration,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<String, ServiceError> {
        let key = EncodingKey::from_ed_pem(private_key_pem.as_bytes())
            .map_err(|e| ServiceError::InvalidArgument(format!("invalid private key: {}", e)))?;

        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(kid.to_string());
        let claims = ServiceUserClaims {
            sub: service_user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Some(Uuid::new_v4().to_string()),
        };
        encode(&header, &claims, &key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("token signing failed: {}", e)))
    }

    async fn require_enabled(&self, id: Uuid) -> Result<ServiceUser, ServiceError> {
        let service_user = self.get_service_user(id).await?;
        if !service_user.is_enabled() {
            return Err(ServiceError::FailedPrecondition(
                "service user is disabled".to_string(),
            ));
        }
        Ok(service_user)
    }
}

fn decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), ServiceError> {
    match jwk.kty.as_str() {
        "OKP" => {
            let x = jwk
                .x
                .as_deref()
                .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("jwk missing x")))?;
            let key = DecodingKey::from_ed_components(x)
                .map_err(|e| ServiceError::Internal(anyhow::anyhow!("bad stored key: {}", e)))?;
            Ok((key, Algorithm::EdDSA))
        }
        "RSA" => {
            let n = jwk
                .n
                .as_deref()
                .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("jwk missing n")))?;
            let e = jwk
                .e
                .as_deref()
                .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("jwk missing e")))?;
            let key = DecodingKey::from_rsa_components(n, e)
                .map_err(|e| ServiceError::Internal(anyhow::anyhow!("bad stored key: {}", e)))?;
            Ok((key, Algorithm::RS256))
        }
        other => Err(ServiceError::Internal(anyhow::anyhow!(
            "unsupported key type {:?}",
            other
        ))),
    }
}

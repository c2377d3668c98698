use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Newtype for a shared secret to prevent accidental logging.
#[derive(Clone)]
pub struct CredentialSecret(String);

impl CredentialSecret {
    pub fn new(secret: String) -> Self {
        Self(secret)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for CredentialSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialSecret(..)")
    }
}

/// Newtype for a stored secret hash.
#[derive(Debug, Clone)]
pub struct SecretHash(String);

impl SecretHash {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash a secret using Argon2id.
///
/// Salt is generated automatically and included in the hash string.
pub fn hash_secret(secret: &CredentialSecret) -> Result<SecretHash, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let hash = argon2
        .hash_password(secret.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash secret: {}", e))?
        .to_string();

    Ok(SecretHash::new(hash))
}

/// Verify a secret against a stored hash.
///
/// Uses constant-time comparison to prevent timing attacks.
pub fn verify_secret(secret: &CredentialSecret, hash: &SecretHash) -> Result<(), anyhow::Error> {
    let parsed = PasswordHash::new(hash.as_str())
        .map_err(|e| anyhow::anyhow!("invalid secret hash: {}", e))?;

    Argon2::default()
        .verify_password(secret.as_str().as_bytes(), &parsed)
        .map_err(|_| anyhow::anyhow!("secret verification failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let secret = CredentialSecret::new("super-secret".to_string());
        let hash = hash_secret(&secret).unwrap();
        assert!(verify_secret(&secret, &hash).is_ok());
    }

    #[test]
    fn test_wrong_secret_fails() {
        let secret = CredentialSecret::new("super-secret".to_string());
        let hash = hash_secret(&secret).unwrap();
        let wrong = CredentialSecret::new("not-the-secret".to_string());
        assert!(verify_secret(&wrong, &hash).is_err());
    }

    #[test]
    fn test_debug_does_not_leak() {
        let secret = CredentialSecret::new("super-secret".to_string());
        assert_eq!(format!("{:?}", secret), "CredentialSecret(..)");
    }
}

//! Crypto helpers shared by the authentication strategies and the
//! credential service.

pub mod secret;

pub use secret::{hash_secret, verify_secret, CredentialSecret, SecretHash};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use subtle::ConstantTimeEq;

/// Generate a 6-digit one-time code with uniform distribution.
pub fn generate_otp() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", n)
}

/// Generate a 128-bit random nonce, hex encoded.
pub fn generate_nonce() -> String {
    let mut buf = [0u8; 16];
    rand::thread_rng().fill(&mut buf);
    hex::encode(buf)
}

/// Generate a random token for domain verification TXT records.
pub fn generate_verification_token() -> String {
    let mut buf = [0u8; 16];
    rand::thread_rng().fill(&mut buf);
    hex::encode(buf)
}

/// Generate a high-entropy client secret, url-safe base64 encoded.
pub fn generate_client_secret() -> String {
    let mut buf = [0u8; 32];
    rand::thread_rng().fill(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Constant-time string comparison.
///
/// Length is checked first; equal-length inputs are compared without
/// short-circuiting.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

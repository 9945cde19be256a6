//! Credential hashing and random-code generation.
//!
//! Passwords and client secrets go through bcrypt; refresh tokens are
//! already high-entropy JWTs, so their at-rest digest is a plain SHA-256
//! (computed on every refresh, so it has to be fast).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Default bcrypt cost factor.
pub const DEFAULT_HASH_COST: u32 = 12;

/// Errors from the hashing primitives.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("bcrypt failure: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
}

/// Hash a password (or client secret) with bcrypt at the given cost.
pub fn hash_password(plain: &str, cost: u32) -> Result<String, CryptoError> {
    Ok(bcrypt::hash(plain, cost)?)
}

/// Verify a candidate against a stored bcrypt hash.
///
/// bcrypt comparison is constant-time per candidate.
pub fn verify_password(plain: &str, stored: &str) -> Result<bool, CryptoError> {
    Ok(bcrypt::verify(plain, stored)?)
}

/// Generate a fresh authorization code: 32 bytes from the OS CSPRNG,
/// URL-safe base64 without padding.
///
/// Collisions over a code's ten-minute window are negligible; the unique
/// index on the code column is still authoritative.
pub fn new_auth_code() -> String {
    let mut bytes = [0u8; 32];
    rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 digest of a raw token, lowercase hex.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low cost keeps the suite fast; production uses DEFAULT_HASH_COST.
    const TEST_COST: u32 = 4;

    #[test]
    fn password_round_trip() {
        let hash = hash_password("pw123", TEST_COST).unwrap();
        assert_ne!(hash, "pw123");
        assert!(verify_password("pw123", &hash).unwrap());
        assert!(!verify_password("pw124", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("pw123", TEST_COST).unwrap();
        let b = hash_password("pw123", TEST_COST).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn auth_codes_are_unique_and_urlsafe() {
        let a = new_auth_code();
        let b = new_auth_code();
        assert_ne!(a, b);
        // 32 bytes -> 43 base64url chars, no padding
        assert_eq!(a.len(), 43);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn digest_is_stable_hex() {
        let d = token_digest("some.jwt.value");
        assert_eq!(d, token_digest("some.jwt.value"));
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(d, token_digest("some.jwt.valuf"));
    }
}

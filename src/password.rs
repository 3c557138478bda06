//! Argon2 password hashing.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::error;

use crate::error::AuthError;

/// Hash a plaintext password with a fresh random salt.
pub fn hash_password(plain: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!("argon2 hash_password failed: {}", e);
            AuthError::Hash(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Verify a plaintext password against a stored hash.
///
/// Returns `Ok(false)` for a wrong password; `Err` only when the stored
/// hash itself is unparseable (corrupt data, not user input).
pub fn verify_password(plain: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!("argon2 hash parse failed: {}", e);
        AuthError::Hash(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let hash = hash_password("Secur3P@ssw0rd!").unwrap();
        assert!(verify_password("Secur3P@ssw0rd!", &hash).unwrap());
    }

    #[test]
    fn test_verify_rejects_wrong_password() {
        let hash = hash_password("correct-horse-battery-staple").unwrap();
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn test_verify_errors_on_malformed_hash() {
        assert!(verify_password("anything", "not-a-valid-hash").is_err());
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
    }
}

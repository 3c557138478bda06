//! Random token material, one-way hashing and constant-time verification.
//!
//! Raw tokens (API tokens, remember-me validators, magic-link tokens) are
//! random bytes in base64url. Only their SHA-256 hash is ever stored; the
//! raw value exists in transit and on the client.

use rand::Rng;
use rand::RngCore;

/// Generate `n` random bytes from the OS-seeded generator.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; n];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Generate a random token of `n` bytes, base64url-encoded.
pub fn random_token(n: usize) -> String {
    base64_encode(&random_bytes(n))
}

/// Generate a zero-padded numeric one-time code of `digits` digits.
pub fn numeric_code(digits: u32) -> String {
    let max = 10u64.pow(digits);
    let n = rand::rng().random_range(0..max);
    format!("{:0width$}", n, width = digits as usize)
}

/// One-way hash of a raw token, base64url-encoded SHA-256.
pub fn hash_token(raw: &str) -> String {
    base64_encode(&openssl::sha::sha256(raw.as_bytes()))
}

/// Compare a raw token against a stored hash without leaking timing.
///
/// The comparison is hash-against-hash over fixed-length digests, so
/// execution time does not correlate with matching prefix length of the
/// raw value.
pub fn verify_hashed(raw: &str, stored_hash: &str) -> bool {
    let computed = openssl::sha::sha256(raw.as_bytes());
    let Some(stored) = base64_decode(stored_hash) else {
        return false;
    };
    stored.len() == computed.len() && openssl::memcmp::eq(&computed, &stored)
}

pub fn base64_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

fn base64_decode(data: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_tokens_are_unique() {
        assert_ne!(random_token(20), random_token(20));
    }

    #[test]
    fn test_numeric_code_width() {
        for _ in 0..50 {
            let code = numeric_code(6);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_verify_hashed_roundtrip() {
        let raw = random_token(20);
        let hash = hash_token(&raw);
        assert!(verify_hashed(&raw, &hash));
        assert!(!verify_hashed("something-else", &hash));
    }

    #[test]
    fn test_verify_hashed_rejects_garbage_hash() {
        assert!(!verify_hashed("raw", "not-base64!!!"));
        assert!(!verify_hashed("raw", ""));
    }

    #[test]
    fn test_single_character_mutation_fails() {
        let raw = random_token(20);
        let hash = hash_token(&raw);
        let mut mutated = raw.into_bytes();
        mutated[0] = if mutated[0] == b'A' { b'B' } else { b'A' };
        let mutated = String::from_utf8(mutated).unwrap();
        assert!(!verify_hashed(&mutated, &hash));
    }
}

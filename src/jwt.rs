//! JWT encoding and validation behind a pluggable codec.
//!
//! The [`JwtAuthenticator`](crate::strategy::JwtAuthenticator) only needs
//! encode/decode; signature verification is the codec's responsibility.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by an issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user UUID). Defaults to empty when the token has no
    /// subject; callers must treat an empty subject as missing.
    #[serde(default)]
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Encode/decode contract. Cryptographic verification lives behind this
/// seam so deployments can swap algorithms or key handling.
pub trait JwtCodec: Send + Sync {
    fn encode(&self, claims: &Claims) -> Result<String, JwtError>;
    fn decode(&self, token: &str) -> Result<Claims, JwtError>;
}

/// HS256 codec over a shared secret.
#[derive(Clone)]
pub struct Hs256Codec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl Hs256Codec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Issue a token for a user UUID, valid for `lifetime` seconds from `now`.
    pub fn issue(&self, user_uuid: &str, now: i64, lifetime: i64) -> Result<String, JwtError> {
        let claims = Claims {
            sub: user_uuid.to_string(),
            iat: now as u64,
            exp: (now + lifetime) as u64,
        };
        self.encode(&claims)
    }
}

impl JwtCodec for Hs256Codec {
    fn encode(&self, claims: &Claims) -> Result<String, JwtError> {
        jsonwebtoken::encode(&Header::default(), claims, &self.encoding_key)
            .map_err(JwtError::Encoding)
    }

    fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(JwtError::Decoding)?;
        Ok(token_data.claims)
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Error decoding the token (bad signature, expired, malformed)
    Decoding(jsonwebtoken::errors::Error),
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
        }
    }
}

impl std::error::Error for JwtError {}

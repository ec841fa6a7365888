//! Session token issuance and verification.
//!
//! Sessions are stateless HS256 JWTs over a configuration-supplied secret.
//! There is no refresh or rotation; expiry is fixed at issuance.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Claims embedded in every session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    /// Numeric user id (matches the user table row id).
    pub sub: usize,
    /// Lowercased account email, embedded so display needs no extra lookup.
    pub email: String,
    /// Issued-at (Unix timestamp, seconds).
    pub iat: u64,
    /// Expiry (Unix timestamp, seconds).
    pub exp: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionTokenError {
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
}

pub struct SessionTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_seconds: u64,
}

impl SessionTokenIssuer {
    pub fn new(secret: &str, expiry_days: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_seconds: expiry_days * 86_400,
        }
    }

    pub fn issue(&self, user_id: usize, email: &str) -> anyhow::Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before Unix epoch")
            .as_secs();
        let claims = SessionClaims {
            sub: user_id,
            email: email.to_string(),
            iat: now,
            exp: now + self.expiry_seconds,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionTokenError> {
        decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionTokenError::Expired,
                _ => SessionTokenError::Invalid,
            })
    }
}

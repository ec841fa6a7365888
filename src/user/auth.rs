//! Password hashing and password policy

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

mod storynest_argon2 {
    use anyhow::{anyhow, Result};
    use argon2::{
        password_hash::{
            rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        },
        Argon2,
    };

    pub fn hash(plain: &[u8]) -> Result<String> {
        let argon2 = Argon2::default();
        let salt = SaltString::generate(&mut OsRng);
        let hash_string = argon2
            .hash_password(plain, &salt)
            .map_err(|err| anyhow!("{}", err))?
            .to_string();
        Ok(hash_string)
    }

    pub fn verify<T: AsRef<str>>(plain_pw: &[u8], target_hash: T) -> Result<bool> {
        let argon2 = Argon2::default();
        let password_hash =
            PasswordHash::new(target_hash.as_ref()).map_err(|err| anyhow!("{}", err))?;
        Ok(argon2.verify_password(plain_pw, &password_hash).is_ok())
    }
}

/// Named hasher so the algorithm used for a stored digest is persisted next
/// to it and new algorithms can be phased in without rehashing everyone.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub enum StorynestHasher {
    Argon2,
}

impl FromStr for StorynestHasher {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "argon2" => Ok(StorynestHasher::Argon2),
            _ => bail!("Unknown hasher {}", s),
        }
    }
}

impl std::fmt::Display for StorynestHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorynestHasher::Argon2 => write!(f, "argon2"),
        }
    }
}

impl StorynestHasher {
    /// Hashes a password. Surrounding whitespace is trimmed before hashing;
    /// a password that is empty after trimming is rejected.
    pub fn hash<T: AsRef<str>>(&self, plain: T) -> Result<String> {
        let normalized = plain.as_ref().trim();
        if normalized.is_empty() {
            bail!("Password cannot be empty");
        }
        match self {
            StorynestHasher::Argon2 => storynest_argon2::hash(normalized.as_bytes()),
        }
    }

    /// Verifies a candidate against a stored digest with the same
    /// normalization as `hash`. A mismatch is `Ok(false)`, never an error;
    /// an empty stored digest verifies false.
    pub fn verify<T: AsRef<str>>(&self, plain_pw: T, target_hash: T) -> Result<bool> {
        let normalized = plain_pw.as_ref().trim();
        if normalized.is_empty() || target_hash.as_ref().is_empty() {
            return Ok(false);
        }
        match self {
            StorynestHasher::Argon2 => {
                storynest_argon2::verify(normalized.as_bytes(), target_hash)
            }
        }
    }
}

/// Registration/reset password policy: at least 8 characters containing at
/// least one letter and one digit.
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    let password = password.trim();
    if password.len() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err("Password must contain at least one letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit".to_string());
    }
    Ok(())
}

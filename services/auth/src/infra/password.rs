//! Argon2id password hashing.
//!
//! Hashing and verification are CPU-bound and run on the blocking pool so
//! they never stall the async workers.

use anyhow::Context as _;
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier};

use crate::error::AuthServiceError;

#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl Default for PasswordHasher {
    /// OWASP baseline: m=19456 KiB, t=2, p=1.
    fn default() -> Self {
        Self {
            params: Params::new(19_456, 2, 1, None).unwrap_or_default(),
        }
    }
}

impl PasswordHasher {
    /// Cheapest parameters argon2 accepts. For tests only.
    pub fn insecure_fast() -> Self {
        Self {
            params: Params::new(Params::MIN_M_COST, 1, 1, None).unwrap_or_default(),
        }
    }

    pub async fn hash(&self, password: &str) -> Result<String, AuthServiceError> {
        let params = self.params.clone();
        let password = password.to_owned();
        let hash = tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::new(Algorithm::Argon2id, argon2::Version::V0x13, params)
                .hash_password(password.as_bytes(), &salt)
                .map(|h| h.to_string())
                .map_err(|e| anyhow::anyhow!("hash password: {e}"))
        })
        .await
        .context("hash password task")??;
        Ok(hash)
    }

    /// `Ok(false)` on mismatch. A malformed stored hash is an internal error.
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthServiceError> {
        let password = password.to_owned();
        let hash = hash.to_owned();
        let matched = tokio::task::spawn_blocking(move || {
            let parsed =
                PasswordHash::new(&hash).map_err(|e| anyhow::anyhow!("invalid hash format: {e}"))?;
            // Parameters come from the PHC string, not from `self`.
            match Argon2::default().verify_password(password.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(e) => Err(anyhow::anyhow!("verify password: {e}")),
            }
        })
        .await
        .context("verify password task")??;
        Ok(matched)
    }
}

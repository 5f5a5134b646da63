// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Password hashing and verification (Argon2id, PHC strings).

use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use password_hash::{PasswordHash, SaltString};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;

const SALT_LEN: usize = 16;

/// Secret hashing errors. Verification never errors on a bad secret; it answers false.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("random source failure")]
    Random,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("hashing task failed: {0}")]
    Task(String),
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
        }
    }
}

/// One-way, salted, slow hash for identity secrets.
///
/// Argon2 runs on the blocking pool so a login never stalls a runtime worker.
#[derive(Clone)]
pub struct SecretVerifier {
    hasher: Arc<Hasher>,
}

struct Hasher {
    argon2: Argon2<'static>,
    rng: SystemRandom,
    /// Digest checked when the username is unknown, so lookups that miss cost
    /// the same as lookups that hit.
    decoy: String,
}

impl Hasher {
    fn hash(&self, secret: &str) -> Result<String, SecretError> {
        let mut salt_bytes = [0u8; SALT_LEN];
        self.rng
            .fill(&mut salt_bytes)
            .map_err(|_| SecretError::Random)?;
        let salt =
            SaltString::encode_b64(&salt_bytes).map_err(|e| SecretError::Hash(e.to_string()))?;

        Ok(self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| SecretError::Hash(e.to_string()))?
            .to_string())
    }

    /// Parameters are read from the digest itself, and the final comparison of
    /// hash outputs is constant-time (`password_hash::Output` equality).
    fn verify(&self, secret: &str, digest: &str) -> bool {
        match PasswordHash::new(digest) {
            Ok(parsed) => self
                .argon2
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

impl SecretVerifier {
    pub fn new(cost: HashCost) -> Result<Self, SecretError> {
        let params = Params::new(cost.memory_kib, cost.iterations, Params::DEFAULT_P_COST, None)
            .map_err(|e| SecretError::Hash(e.to_string()))?;
        let mut hasher = Hasher {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            rng: SystemRandom::new(),
            decoy: String::new(),
        };
        hasher.decoy = hasher.hash("decoy-secret-for-missing-identities")?;
        Ok(Self {
            hasher: Arc::new(hasher),
        })
    }

    /// Hash with a fresh random salt per call.
    pub async fn hash(&self, secret: &str) -> Result<String, SecretError> {
        let hasher = Arc::clone(&self.hasher);
        let secret = secret.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| SecretError::Task(e.to_string()))?
    }

    /// Check `secret` against a stored digest.
    pub async fn verify(&self, secret: &str, digest: &str) -> Result<bool, SecretError> {
        let hasher = Arc::clone(&self.hasher);
        let (secret, digest) = (secret.to_string(), digest.to_string());
        tokio::task::spawn_blocking(move || hasher.verify(&secret, &digest))
            .await
            .map_err(|e| SecretError::Task(e.to_string()))
    }

    /// Burn the same work as a real verification, always answering false.
    pub async fn verify_decoy(&self, secret: &str) -> Result<bool, SecretError> {
        self.verify(secret, &self.hasher.decoy).await?;
        Ok(false)
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use crate::db::CoachDeletion;
use crate::services::credentials::{CredentialSettings, RefreshPolicy};
use crate::services::secrets::HashCost;
use std::env;
use std::str::FromStr;

/// Minimum signing key length in bytes.
pub const MIN_SIGNING_KEY_LEN: usize = 32;

/// Credentials for the admin created at startup when no such user exists.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Master key for session token signing (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Access token lifetime
    pub access_token_ttl_secs: i64,
    /// Refresh token lifetime
    pub refresh_token_ttl_secs: i64,
    pub refresh_policy: RefreshPolicy,
    /// How long refresh-token records are kept after they expire
    pub revocation_retention_secs: i64,
    /// Whether unauthenticated callers may register athletes
    pub allow_self_registration: bool,
    pub coach_deletion: CoachDeletion,
    pub password_hash_cost: HashCost,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!!".to_vec(),
            access_token_ttl_secs: 300,
            refresh_token_ttl_secs: 86400,
            refresh_policy: RefreshPolicy::Rotate,
            revocation_retention_secs: 86400,
            allow_self_registration: false,
            coach_deletion: CoachDeletion::Block,
            password_hash_cost: HashCost {
                memory_kib: 1024,
                iterations: 1,
            },
            bootstrap_admin: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file is read first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let jwt_signing_key = env::var("JWT_SIGNING_KEY")
            .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
            .into_bytes();
        if jwt_signing_key.len() < MIN_SIGNING_KEY_LEN {
            return Err(ConfigError::WeakSigningKey(jwt_signing_key.len()));
        }

        let default_cost = HashCost::default();

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: parse_var("PORT", 8080)?,
            jwt_signing_key,
            access_token_ttl_secs: parse_var("ACCESS_TOKEN_TTL_SECS", 300)?,
            refresh_token_ttl_secs: parse_var("REFRESH_TOKEN_TTL_SECS", 86400)?,
            refresh_policy: parse_var("REFRESH_ROTATION", RefreshPolicy::Rotate)?,
            revocation_retention_secs: parse_var("REVOCATION_RETENTION_SECS", 86400)?,
            allow_self_registration: parse_var("ALLOW_SELF_REGISTRATION", false)?,
            coach_deletion: parse_var("COACH_DELETION", CoachDeletion::Block)?,
            password_hash_cost: HashCost {
                memory_kib: parse_var("PASSWORD_HASH_MEMORY_KIB", default_cost.memory_kib)?,
                iterations: parse_var("PASSWORD_HASH_ITERATIONS", default_cost.iterations)?,
            },
            bootstrap_admin: bootstrap_admin_from_env()?,
        })
    }

    pub fn credential_settings(&self) -> CredentialSettings {
        CredentialSettings {
            access_ttl_secs: self.access_token_ttl_secs,
            refresh_ttl_secs: self.refresh_token_ttl_secs,
            refresh_policy: self.refresh_policy,
            revocation_retention_secs: self.revocation_retention_secs,
        }
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn bootstrap_admin_from_env() -> Result<Option<BootstrapAdmin>, ConfigError> {
    let Ok(username) = env::var("BOOTSTRAP_ADMIN_USERNAME") else {
        return Ok(None);
    };
    Ok(Some(BootstrapAdmin {
        username,
        email: env::var("BOOTSTRAP_ADMIN_EMAIL")
            .map_err(|_| ConfigError::Missing("BOOTSTRAP_ADMIN_EMAIL"))?,
        password: env::var("BOOTSTRAP_ADMIN_PASSWORD")
            .map_err(|_| ConfigError::Missing("BOOTSTRAP_ADMIN_PASSWORD"))?,
    }))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("JWT_SIGNING_KEY must be at least {MIN_SIGNING_KEY_LEN} bytes, got {0}")]
    WeakSigningKey(usize),
}

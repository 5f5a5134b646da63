// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session credential models.

use super::identity::IdentityId;
use serde::{Deserialize, Serialize};

/// Access + refresh token pair handed to the client.
///
/// Both tokens are opaque to callers; only the credential manager interprets them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access: String,
    pub refresh: String,
    /// Access token expiry (Unix seconds).
    pub access_expires_at: i64,
    /// Refresh token expiry (Unix seconds).
    pub refresh_expires_at: i64,
}

/// Stored state for an issued refresh token, keyed by fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// SHA-256 hex digest of the token.
    pub fingerprint: String,
    /// `None` for tombstones created by revoking a token the store never saw.
    pub identity: Option<IdentityId>,
    /// Expiry (Unix seconds). Records past expiry may be pruned.
    pub expires_at: i64,
    pub revoked: bool,
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session credential lifecycle: issue, refresh, revoke, verify.
//!
//! Access tokens are short-lived HS256 JWTs checked by signature and expiry
//! alone. Refresh tokens are JWTs too, but their validity also depends on the
//! revocation store, keyed by the SHA-256 fingerprint of the token string.
//! Access and refresh tokens are signed with different keys, both derived from
//! the configured signing key with HKDF.

use crate::db::{IdentityStore, RevocationStore, StoreError};
use crate::models::identity::{Identity, IdentityId, Role};
use crate::models::{Credential, RefreshTokenRecord};
use crate::services::authorization::Actor;
use crate::time_utils::unix_now as now;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hkdf::Hkdf;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

const ACCESS_KEY_INFO: &[u8] = b"training-lab/access-token/v1";
const REFRESH_KEY_INFO: &[u8] = b"training-lab/refresh-token/v1";
const TOKEN_ID_LEN: usize = 16;
/// Minimum spacing between sweeps of expired refresh-token records.
const PRUNE_INTERVAL_SECS: i64 = 60;

/// Credential failures. Distinct so clients can tell "log in again" from
/// "retry the refresh".
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("credential expired")]
    Expired,

    #[error("credential revoked")]
    Revoked,

    #[error("malformed credential")]
    Malformed,

    #[error("identity is inactive")]
    Inactive,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("random source failure")]
    Random,
}

/// What happens to a refresh token when it is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPolicy {
    /// Revoke the presented token and hand out a new one.
    #[default]
    Rotate,
    /// Keep the presented token valid until it expires.
    Reuse,
}

impl FromStr for RefreshPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rotate" => Ok(RefreshPolicy::Rotate),
            "reuse" => Ok(RefreshPolicy::Reuse),
            other => Err(format!("unknown refresh policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims shared by both token kinds.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (identity ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    /// Random token ID; keeps tokens minted in the same second distinct.
    pub jti: String,
    pub typ: TokenKind,
    /// Role at issuance (access tokens only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// Token lifetimes and refresh behavior.
#[derive(Debug, Clone, Copy)]
pub struct CredentialSettings {
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub refresh_policy: RefreshPolicy,
    /// How long a refresh-token record is kept past its expiry. Within this
    /// window a revoked token still reports `Revoked`; after it, `Expired`.
    pub revocation_retention_secs: i64,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn derive(master: &[u8], info: &[u8]) -> Result<Self, CredentialError> {
        let mut okm = [0u8; 32];
        Hkdf::<Sha256>::new(None, master)
            .expand(info, &mut okm)
            .map_err(|e| CredentialError::Signing(e.to_string()))?;
        Ok(Self {
            encoding: EncodingKey::from_secret(&okm),
            decoding: DecodingKey::from_secret(&okm),
        })
    }
}

/// SHA-256 hex fingerprint under which a refresh token is tracked.
pub fn fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Issues, refreshes, revokes and verifies session credentials.
pub struct CredentialManager {
    access_keys: KeyPair,
    refresh_keys: KeyPair,
    settings: CredentialSettings,
    identities: Arc<dyn IdentityStore>,
    revocations: Arc<dyn RevocationStore>,
    rng: SystemRandom,
    /// Unix time of the last sweep of expired records.
    last_prune: AtomicI64,
}

impl CredentialManager {
    pub fn new(
        signing_key: &[u8],
        settings: CredentialSettings,
        identities: Arc<dyn IdentityStore>,
        revocations: Arc<dyn RevocationStore>,
    ) -> Result<Self, CredentialError> {
        Ok(Self {
            access_keys: KeyPair::derive(signing_key, ACCESS_KEY_INFO)?,
            refresh_keys: KeyPair::derive(signing_key, REFRESH_KEY_INFO)?,
            settings,
            identities,
            revocations,
            rng: SystemRandom::new(),
            last_prune: AtomicI64::new(i64::MIN),
        })
    }

    pub fn settings(&self) -> &CredentialSettings {
        &self.settings
    }

    /// Issue a fresh access/refresh pair. Every call yields an independent pair.
    pub async fn issue(&self, identity: &Identity) -> Result<Credential, CredentialError> {
        if !identity.active {
            return Err(CredentialError::Inactive);
        }

        self.prune_expired().await?;

        let (access, access_expires_at) = self.mint(identity, TokenKind::Access)?;
        let (refresh, refresh_expires_at) = self.mint(identity, TokenKind::Refresh)?;
        self.track(identity.id, &refresh, refresh_expires_at).await?;

        tracing::debug!(identity = identity.id, "Issued credential pair");

        Ok(Credential {
            access,
            refresh,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Mint a new access token from a refresh token.
    ///
    /// Under [`RefreshPolicy::Rotate`] the new refresh token is recorded before
    /// the presented one is revoked, so one of them is valid at every instant.
    /// If another request already rotated the presented token, this call fails
    /// with `Revoked` and its freshly minted token is revoked as well.
    pub async fn refresh(&self, token: &str) -> Result<Credential, CredentialError> {
        let claims = self.decode(token, TokenKind::Refresh)?;
        let presented = fingerprint(token);

        if self.revocations.contains(&presented).await? {
            tracing::info!(sub = %claims.sub, "Refresh with revoked token");
            return Err(CredentialError::Revoked);
        }
        if claims.exp as i64 <= now() {
            return Err(CredentialError::Expired);
        }

        let identity_id: IdentityId = claims.sub.parse().map_err(|_| CredentialError::Malformed)?;
        let identity = self
            .identities
            .find_by_id(identity_id)
            .await?
            .ok_or(CredentialError::Revoked)?;
        if !identity.active {
            return Err(CredentialError::Inactive);
        }

        let (access, access_expires_at) = self.mint(&identity, TokenKind::Access)?;

        match self.settings.refresh_policy {
            RefreshPolicy::Reuse => Ok(Credential {
                access,
                refresh: token.to_string(),
                access_expires_at,
                refresh_expires_at: claims.exp as i64,
            }),
            RefreshPolicy::Rotate => {
                let (refresh, refresh_expires_at) = self.mint(&identity, TokenKind::Refresh)?;
                self.track(identity.id, &refresh, refresh_expires_at).await?;

                if !self
                    .revocations
                    .add(&presented, claims.exp as i64)
                    .await?
                {
                    // Lost a race with a concurrent rotation of the same token.
                    self.revocations
                        .add(&fingerprint(&refresh), refresh_expires_at)
                        .await?;
                    return Err(CredentialError::Revoked);
                }

                tracing::debug!(identity = identity.id, "Rotated refresh token");
                Ok(Credential {
                    access,
                    refresh,
                    access_expires_at,
                    refresh_expires_at,
                })
            }
        }
    }

    /// Revoke a refresh token. Idempotent: already-revoked and unrecognized
    /// tokens succeed without revealing anything.
    pub async fn revoke(&self, token: &str) -> Result<(), CredentialError> {
        // Tokens we never signed are not worth a store entry.
        let Ok(claims) = self.decode(token, TokenKind::Refresh) else {
            return Ok(());
        };
        let newly = self
            .revocations
            .add(&fingerprint(token), claims.exp as i64)
            .await?;
        tracing::debug!(sub = %claims.sub, newly, "Refresh token revoked");
        Ok(())
    }

    /// Revoke every refresh token issued to an identity.
    pub async fn revoke_all_for(&self, identity: IdentityId) -> Result<usize, CredentialError> {
        let revoked = self.revocations.revoke_all_for(identity).await?;
        if revoked > 0 {
            tracing::info!(identity, revoked, "Revoked outstanding refresh tokens");
        }
        Ok(revoked)
    }

    /// Drop refresh-token records that expired more than the retention window
    /// ago. At most one sweep runs per interval; other callers skip it.
    pub async fn prune_expired(&self) -> Result<usize, CredentialError> {
        let now = now();
        let last = self.last_prune.load(Ordering::Relaxed);
        if now.saturating_sub(last) < PRUNE_INTERVAL_SECS
            || self
                .last_prune
                .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_err()
        {
            return Ok(0);
        }

        let cutoff = now - self.settings.revocation_retention_secs;
        let pruned = self.revocations.prune_expired(cutoff).await?;
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned expired refresh token records");
        }
        Ok(pruned)
    }

    /// Stateless access-token check: signature, token kind and expiry only.
    pub fn verify_access(&self, token: &str) -> Result<Actor, CredentialError> {
        let claims = self.decode(token, TokenKind::Access)?;
        if claims.exp as i64 <= now() {
            return Err(CredentialError::Expired);
        }
        let id = claims.sub.parse().map_err(|_| CredentialError::Malformed)?;
        let role = claims.role.ok_or(CredentialError::Malformed)?;
        Ok(Actor { id, role })
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access_keys,
            TokenKind::Refresh => &self.refresh_keys,
        }
    }

    fn ttl(&self, kind: TokenKind) -> i64 {
        match kind {
            TokenKind::Access => self.settings.access_ttl_secs,
            TokenKind::Refresh => self.settings.refresh_ttl_secs,
        }
    }

    fn token_id(&self) -> Result<String, CredentialError> {
        let mut bytes = [0u8; TOKEN_ID_LEN];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| CredentialError::Random)?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    fn mint(&self, identity: &Identity, kind: TokenKind) -> Result<(String, i64), CredentialError> {
        let issued_at = now();
        let expires_at = issued_at + self.ttl(kind);

        let claims = Claims {
            sub: identity.id.to_string(),
            exp: expires_at.max(0) as usize,
            iat: issued_at as usize,
            jti: self.token_id()?,
            typ: kind,
            role: (kind == TokenKind::Access).then_some(identity.role),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.keys(kind).encoding,
        )
        .map_err(|e| CredentialError::Signing(e.to_string()))?;
        Ok((token, expires_at))
    }

    /// Verify signature and kind. Expiry is checked by the callers so an
    /// expired token reports `Expired` rather than `Malformed`.
    fn decode(&self, token: &str, kind: TokenKind) -> Result<Claims, CredentialError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.keys(kind).decoding, &validation)
            .map_err(|_| CredentialError::Malformed)?;
        if data.claims.typ != kind {
            return Err(CredentialError::Malformed);
        }
        Ok(data.claims)
    }

    async fn track(
        &self,
        identity: IdentityId,
        refresh: &str,
        expires_at: i64,
    ) -> Result<(), CredentialError> {
        self.revocations
            .register(RefreshTokenRecord {
                fingerprint: fingerprint(refresh),
                identity: Some(identity),
                expires_at,
                revoked: false,
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{IdentityUpdate, MemoryStore};
    use crate::models::identity::Discipline;

    const KEY: &[u8] = b"test_jwt_key_32_bytes_minimum!!!";

    fn settings(policy: RefreshPolicy) -> CredentialSettings {
        CredentialSettings {
            access_ttl_secs: 300,
            refresh_ttl_secs: 3600,
            refresh_policy: policy,
            revocation_retention_secs: 600,
        }
    }

    async fn setup(settings: CredentialSettings) -> (CredentialManager, MemoryStore, Identity) {
        let store = MemoryStore::new();
        let identity = store
            .insert(Identity {
                id: 0,
                username: "coach".to_string(),
                email: "coach@example.com".to_string(),
                secret_hash: String::new(),
                role: Role::Coach,
                coach: None,
                active: true,
                name: String::new(),
                discipline: Discipline::Athletics,
                date_of_birth: None,
                phone_number: None,
                created_at: String::new(),
            })
            .await
            .unwrap();
        let manager = CredentialManager::new(
            KEY,
            settings,
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        )
        .unwrap();
        (manager, store, identity)
    }

    #[tokio::test]
    async fn issued_access_token_verifies() {
        let (manager, _, identity) = setup(settings(RefreshPolicy::Rotate)).await;
        let credential = manager.issue(&identity).await.unwrap();

        let actor = manager.verify_access(&credential.access).unwrap();
        assert_eq!(actor.id, identity.id);
        assert_eq!(actor.role, Role::Coach);
    }

    #[tokio::test]
    async fn issue_twice_gives_independent_pairs() {
        let (manager, _, identity) = setup(settings(RefreshPolicy::Rotate)).await;
        let first = manager.issue(&identity).await.unwrap();
        let second = manager.issue(&identity).await.unwrap();

        assert_ne!(first.access, second.access);
        assert_ne!(first.refresh, second.refresh);
        manager.refresh(&first.refresh).await.unwrap();
        manager.refresh(&second.refresh).await.unwrap();
    }

    #[tokio::test]
    async fn inactive_identity_gets_no_credential() {
        let (manager, _, mut identity) = setup(settings(RefreshPolicy::Rotate)).await;
        identity.active = false;
        assert!(matches!(
            manager.issue(&identity).await,
            Err(CredentialError::Inactive)
        ));
    }

    #[tokio::test]
    async fn rotation_revokes_presented_token() {
        let (manager, _, identity) = setup(settings(RefreshPolicy::Rotate)).await;
        let original = manager.issue(&identity).await.unwrap();

        let rotated = manager.refresh(&original.refresh).await.unwrap();
        assert_ne!(rotated.refresh, original.refresh);
        assert!(manager.verify_access(&rotated.access).is_ok());

        assert!(matches!(
            manager.refresh(&original.refresh).await,
            Err(CredentialError::Revoked)
        ));
        assert!(manager.refresh(&rotated.refresh).await.is_ok());
    }

    #[tokio::test]
    async fn reuse_policy_keeps_refresh_token() {
        let (manager, _, identity) = setup(settings(RefreshPolicy::Reuse)).await;
        let original = manager.issue(&identity).await.unwrap();

        let first = manager.refresh(&original.refresh).await.unwrap();
        let second = manager.refresh(&original.refresh).await.unwrap();
        assert_eq!(first.refresh, original.refresh);
        assert_eq!(second.refresh, original.refresh);
    }

    #[tokio::test]
    async fn expired_refresh_token_reports_expired() {
        let mut expired = settings(RefreshPolicy::Rotate);
        expired.refresh_ttl_secs = -10;
        let (manager, _, identity) = setup(expired).await;
        let credential = manager.issue(&identity).await.unwrap();

        assert!(matches!(
            manager.refresh(&credential.refresh).await,
            Err(CredentialError::Expired)
        ));
    }

    #[tokio::test]
    async fn revoked_wins_over_expiry_check() {
        let mut expired = settings(RefreshPolicy::Rotate);
        expired.refresh_ttl_secs = -10;
        let (manager, _, identity) = setup(expired).await;
        let credential = manager.issue(&identity).await.unwrap();

        manager.revoke(&credential.refresh).await.unwrap();
        assert!(matches!(
            manager.refresh(&credential.refresh).await,
            Err(CredentialError::Revoked)
        ));
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let (manager, _, identity) = setup(settings(RefreshPolicy::Rotate)).await;
        let credential = manager.issue(&identity).await.unwrap();

        manager.revoke(&credential.refresh).await.unwrap();
        manager.revoke(&credential.refresh).await.unwrap();
        manager.revoke("never-issued").await.unwrap();
        assert!(matches!(
            manager.refresh(&credential.refresh).await,
            Err(CredentialError::Revoked)
        ));
    }

    #[tokio::test]
    async fn revoke_all_for_identity() {
        let (manager, _, identity) = setup(settings(RefreshPolicy::Rotate)).await;
        let a = manager.issue(&identity).await.unwrap();
        let b = manager.issue(&identity).await.unwrap();

        assert_eq!(manager.revoke_all_for(identity.id).await.unwrap(), 2);
        for credential in [a, b] {
            assert!(matches!(
                manager.refresh(&credential.refresh).await,
                Err(CredentialError::Revoked)
            ));
        }
    }

    #[tokio::test]
    async fn issue_prunes_records_past_retention() {
        let (manager, store, identity) = setup(settings(RefreshPolicy::Rotate)).await;
        store
            .register(RefreshTokenRecord {
                fingerprint: "stale".to_string(),
                identity: Some(identity.id),
                expires_at: now() - 3600,
                revoked: true,
            })
            .await
            .unwrap();
        assert!(store.contains("stale").await.unwrap());

        let credential = manager.issue(&identity).await.unwrap();

        assert!(!store.contains("stale").await.unwrap());
        assert!(manager.refresh(&credential.refresh).await.is_ok());
    }

    #[tokio::test]
    async fn pruned_revoked_token_reports_expired() {
        let mut short = settings(RefreshPolicy::Rotate);
        short.refresh_ttl_secs = -10;
        short.revocation_retention_secs = 0;
        let (manager, store, identity) = setup(short).await;
        let credential = manager.issue(&identity).await.unwrap();

        manager.revoke(&credential.refresh).await.unwrap();
        assert!(matches!(
            manager.refresh(&credential.refresh).await,
            Err(CredentialError::Revoked)
        ));

        assert_eq!(store.prune_expired(now()).await.unwrap(), 1);
        assert!(matches!(
            manager.refresh(&credential.refresh).await,
            Err(CredentialError::Expired)
        ));
    }

    #[tokio::test]
    async fn deactivated_identity_cannot_refresh() {
        let (manager, store, identity) = setup(settings(RefreshPolicy::Rotate)).await;
        let credential = manager.issue(&identity).await.unwrap();

        store
            .update(identity.id, IdentityUpdate::Active(false))
            .await
            .unwrap();
        assert!(matches!(
            manager.refresh(&credential.refresh).await,
            Err(CredentialError::Inactive)
        ));
    }

    #[tokio::test]
    async fn expired_access_token() {
        let mut expired = settings(RefreshPolicy::Rotate);
        expired.access_ttl_secs = -10;
        let (manager, _, identity) = setup(expired).await;
        let credential = manager.issue(&identity).await.unwrap();

        assert!(matches!(
            manager.verify_access(&credential.access),
            Err(CredentialError::Expired)
        ));
    }

    #[tokio::test]
    async fn token_kinds_are_not_interchangeable() {
        let (manager, _, identity) = setup(settings(RefreshPolicy::Rotate)).await;
        let credential = manager.issue(&identity).await.unwrap();

        assert!(matches!(
            manager.verify_access(&credential.refresh),
            Err(CredentialError::Malformed)
        ));
        assert!(matches!(
            manager.refresh(&credential.access).await,
            Err(CredentialError::Malformed)
        ));
        assert!(matches!(
            manager.verify_access("invalid.token.here"),
            Err(CredentialError::Malformed)
        ));
    }

    #[tokio::test]
    async fn foreign_signing_key_is_malformed() {
        let (manager, store, identity) = setup(settings(RefreshPolicy::Rotate)).await;
        let other = CredentialManager::new(
            b"another_signing_key_of_32_bytes!",
            settings(RefreshPolicy::Rotate),
            Arc::new(store.clone()),
            Arc::new(store),
        )
        .unwrap();

        let credential = other.issue(&identity).await.unwrap();
        assert!(matches!(
            manager.verify_access(&credential.access),
            Err(CredentialError::Malformed)
        ));
    }

    #[tokio::test]
    async fn concurrent_rotation_has_one_winner() {
        let (manager, _, identity) = setup(settings(RefreshPolicy::Rotate)).await;
        let manager = Arc::new(manager);
        let credential = manager.issue(&identity).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                let token = credential.refresh.clone();
                tokio::spawn(async move { manager.refresh(&token).await })
            })
            .collect();

        let mut winners = Vec::new();
        for handle in handles {
            if let Ok(rotated) = handle.await.unwrap() {
                winners.push(rotated);
            }
        }
        assert_eq!(winners.len(), 1);
        assert!(manager.refresh(&winners[0].refresh).await.is_ok());
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        let fp = fingerprint("abc");
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, fingerprint("abc"));
        assert_ne!(fp, fingerprint("abd"));
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Login, credential refresh, logout and secret changes.

use crate::db::{IdentityStore, IdentityUpdate};
use crate::error::{AppError, Result};
use crate::models::{Credential, Identity};
use crate::services::authorization::Actor;
use crate::services::credentials::CredentialManager;
use crate::services::secrets::SecretVerifier;
use std::sync::Arc;

pub struct SessionService {
    identities: Arc<dyn IdentityStore>,
    secrets: Arc<SecretVerifier>,
    credentials: Arc<CredentialManager>,
}

impl SessionService {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        secrets: Arc<SecretVerifier>,
        credentials: Arc<CredentialManager>,
    ) -> Self {
        Self {
            identities,
            secrets,
            credentials,
        }
    }

    /// Check a username/secret pair and issue a credential.
    ///
    /// An unknown username still runs a full hash verification. The secret is
    /// checked before the active flag, so `Inactive` is only ever returned to a
    /// caller who knew the secret.
    pub async fn authenticate(&self, username: &str, secret: &str) -> Result<Credential> {
        let identity = self.check_secret(username, secret).await?;

        if !identity.active {
            tracing::warn!(username = %username, "Login for inactive identity");
            return Err(AppError::Inactive);
        }

        let credential = self.credentials.issue(&identity).await?;
        tracing::info!(identity = identity.id, "Login successful");
        Ok(credential)
    }

    pub async fn refresh_credential(&self, refresh_token: &str) -> Result<Credential> {
        Ok(self.credentials.refresh(refresh_token).await?)
    }

    /// Idempotent: unknown or already revoked tokens succeed too.
    pub async fn revoke_credential(&self, refresh_token: &str) -> Result<()> {
        Ok(self.credentials.revoke(refresh_token).await?)
    }

    /// Replace the actor's secret after re-checking the current one, then
    /// revoke every refresh token issued under the old secret.
    pub async fn change_secret(&self, actor: &Actor, current: &str, new: &str) -> Result<()> {
        if new.is_empty() {
            return Err(AppError::BadRequest("new password is required".to_string()));
        }

        let identity = self
            .identities
            .find_by_id(actor.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("identity {}", actor.id)))?;

        if !self.secrets.verify(current, &identity.secret_hash).await? {
            tracing::warn!(identity = actor.id, "Password change with wrong current password");
            return Err(AppError::InvalidCredentials);
        }

        // Only the hash is written; the row read above may be stale by now.
        let secret_hash = self.secrets.hash(new).await?;
        self.identities
            .update(identity.id, IdentityUpdate::SecretHash(secret_hash))
            .await?;

        let revoked = self.credentials.revoke_all_for(identity.id).await?;
        tracing::info!(identity = identity.id, revoked, "Password changed");
        Ok(())
    }

    async fn check_secret(&self, username: &str, secret: &str) -> Result<Identity> {
        match self.identities.find_by_username(username).await? {
            Some(identity) => {
                if self.secrets.verify(secret, &identity.secret_hash).await? {
                    Ok(identity)
                } else {
                    tracing::warn!(username = %username, "Login with wrong password");
                    Err(AppError::InvalidCredentials)
                }
            }
            None => {
                self.secrets.verify_decoy(secret).await?;
                tracing::warn!(username = %username, "Login for unknown username");
                Err(AppError::InvalidCredentials)
            }
        }
    }
}

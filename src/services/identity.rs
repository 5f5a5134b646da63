// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity lifecycle: creation, profile updates, role re-assignment,
//! activation and deletion.
//!
//! Every operation authorizes first, then validates the proposed post-state,
//! and only then touches the store. Writes go through field-scoped store
//! updates, which re-apply the change to the row as it is at write time.

use crate::config::BootstrapAdmin;
use crate::db::{CoachDeletion, Deleted, IdentityStore, IdentityUpdate, RecordStore, UniqueKey};
use crate::error::{AppError, Result};
use crate::models::identity::{
    self, CoachChange, Identity, IdentityChange, IdentityId, InvariantViolation, NewIdentity,
    Relationship, Role,
};
use crate::services::authorization::{require, Action, Actor, DenyReason, Target};
use crate::services::credentials::CredentialManager;
use crate::services::secrets::SecretVerifier;
use crate::time_utils::now_rfc3339;
use std::sync::Arc;

/// Deployment choices for identity management.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPolicy {
    pub allow_self_registration: bool,
    pub coach_deletion: CoachDeletion,
}

pub struct IdentityService {
    identities: Arc<dyn IdentityStore>,
    records: Arc<dyn RecordStore>,
    secrets: Arc<SecretVerifier>,
    credentials: Arc<CredentialManager>,
    policy: IdentityPolicy,
}

impl IdentityService {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        records: Arc<dyn RecordStore>,
        secrets: Arc<SecretVerifier>,
        credentials: Arc<CredentialManager>,
        policy: IdentityPolicy,
    ) -> Self {
        Self {
            identities,
            records,
            secrets,
            credentials,
            policy,
        }
    }

    // ─── Validation ──────────────────────────────────────────

    /// Check I1-I3 for a proposed relationship, resolving the coach's role
    /// with a single store lookup.
    pub async fn validate_relationship(&self, proposed: &Relationship) -> Result<()> {
        let coach_role = match proposed.coach {
            Some(coach_id) => self.identities.find_by_id(coach_id).await?.map(|c| c.role),
            None => None,
        };

        identity::validate(proposed, |_| coach_role).map_err(|violation| {
            tracing::info!(
                identity = ?proposed.id,
                role = %proposed.role,
                coach = ?proposed.coach,
                violation = %violation,
                "Invariant violation"
            );
            AppError::from(violation)
        })
    }

    /// Build and validate the post-state of a PATCH-style change.
    ///
    /// A role in the change that differs from the current role is rejected;
    /// roles move only through [`IdentityService::reassign_role`].
    pub async fn validate_identity_change(
        &self,
        current: &Identity,
        change: &IdentityChange,
    ) -> Result<Identity> {
        if let Some(role) = change.role {
            if role != current.role {
                tracing::info!(
                    identity = current.id,
                    from = %current.role,
                    to = %role,
                    "Role change outside re-assignment"
                );
                return Err(InvariantViolation::RoleImmutable.into());
            }
        }

        let proposed = change.apply_to(current);
        self.validate_relationship(&proposed.relationship()).await?;
        Ok(proposed)
    }

    // ─── Creation ────────────────────────────────────────────

    /// Create an identity.
    ///
    /// With an actor this is the admin creation path and any role may be set.
    /// Without one it is self-registration: only allowed when enabled, and the
    /// role is always athlete.
    pub async fn create_identity(
        &self,
        actor: Option<&Actor>,
        new: NewIdentity,
    ) -> Result<Identity> {
        let role = match actor {
            Some(actor) => {
                require(actor, Action::CreateIdentity, &Target::None)?;
                new.role.unwrap_or(Role::DEFAULT)
            }
            None => {
                if !self.policy.allow_self_registration {
                    return Err(AppError::Unauthorized);
                }
                match new.role {
                    Some(role) if role != Role::DEFAULT => {
                        tracing::warn!(
                            username = %new.username,
                            role = %role,
                            "Self-registration requested elevated role"
                        );
                        return Err(DenyReason::AdminOnly {
                            action: Action::CreateIdentity,
                        }
                        .into());
                    }
                    _ => Role::DEFAULT,
                }
            }
        };

        if new.username.trim().is_empty() {
            return Err(AppError::BadRequest("username is required".to_string()));
        }
        if new.secret.is_empty() {
            return Err(AppError::BadRequest("password is required".to_string()));
        }
        self.check_available(&new.username, &new.email).await?;

        self.validate_relationship(&Relationship {
            id: None,
            role,
            coach: new.coach,
        })
        .await?;

        let draft = Identity {
            id: 0,
            username: new.username,
            email: new.email,
            secret_hash: self.secrets.hash(&new.secret).await?,
            role,
            coach: new.coach,
            active: true,
            name: new.name,
            discipline: new.discipline,
            date_of_birth: new.date_of_birth,
            phone_number: new.phone_number,
            created_at: now_rfc3339(),
        };
        let created = self.identities.insert(draft).await?;

        tracing::info!(
            identity = created.id,
            username = %created.username,
            role = %created.role,
            by = ?actor.map(|a| a.id),
            "Created identity"
        );
        Ok(created)
    }

    /// Create the configured admin unless an identity with that username exists.
    pub async fn ensure_admin(&self, admin: &BootstrapAdmin) -> Result<Identity> {
        if let Some(existing) = self.identities.find_by_username(&admin.username).await? {
            if existing.role != Role::Admin {
                tracing::warn!(
                    username = %existing.username,
                    role = %existing.role,
                    "Bootstrap admin username belongs to a non-admin identity"
                );
            }
            return Ok(existing);
        }

        let draft = Identity {
            id: 0,
            username: admin.username.clone(),
            email: admin.email.clone(),
            secret_hash: self.secrets.hash(&admin.password).await?,
            role: Role::Admin,
            coach: None,
            active: true,
            name: String::new(),
            discipline: Default::default(),
            date_of_birth: None,
            phone_number: None,
            created_at: now_rfc3339(),
        };
        let created = self.identities.insert(draft).await?;
        tracing::info!(identity = created.id, username = %created.username, "Created bootstrap admin");
        Ok(created)
    }

    async fn check_available(&self, username: &str, email: &str) -> Result<()> {
        if self.identities.exists(UniqueKey::Username(username)).await? {
            return Err(AppError::UniquenessViolation {
                field: "username",
                value: username.to_string(),
            });
        }
        if self.identities.exists(UniqueKey::Email(email)).await? {
            return Err(AppError::UniquenessViolation {
                field: "email",
                value: email.to_string(),
            });
        }
        Ok(())
    }

    // ─── Reads ───────────────────────────────────────────────

    pub async fn read_profile(&self, actor: &Actor) -> Result<Identity> {
        require(actor, Action::ReadOwnProfile, &Target::None)?;
        self.load(actor.id).await
    }

    pub async fn get_identity(&self, actor: &Actor, id: IdentityId) -> Result<Identity> {
        let identity = self.load(id).await?;
        require(actor, Action::ReadIdentity, &Target::Identity(identity.subject()))?;
        Ok(identity)
    }

    pub async fn list_identities(&self, actor: &Actor) -> Result<Vec<Identity>> {
        require(actor, Action::ListIdentities, &Target::Directory)?;
        Ok(self.identities.list().await?)
    }

    /// Athletes assigned to `coach_id`.
    pub async fn roster(&self, actor: &Actor, coach_id: IdentityId) -> Result<Vec<Identity>> {
        require(actor, Action::ListIdentities, &Target::Roster(coach_id))?;
        Ok(self.identities.athletes_of(coach_id).await?)
    }

    /// Athletes orphaned by a coach deletion and awaiting re-assignment.
    pub async fn unassigned_athletes(&self, actor: &Actor) -> Result<Vec<Identity>> {
        require(actor, Action::ListIdentities, &Target::Directory)?;
        Ok(self.identities.unassigned_athletes().await?)
    }

    // ─── Mutations ───────────────────────────────────────────

    /// Apply a PATCH-style change. The relationship is re-validated on every
    /// update, so an orphaned athlete cannot be written without a coach.
    pub async fn update_identity(
        &self,
        actor: &Actor,
        id: IdentityId,
        change: IdentityChange,
    ) -> Result<Identity> {
        let current = self.load(id).await?;
        require(actor, Action::UpdateIdentity, &Target::Identity(current.subject()))?;

        self.validate_identity_change(&current, &change).await?;
        let updated = self
            .identities
            .update(id, IdentityUpdate::Profile(change))
            .await?;

        tracing::info!(identity = id, by = actor.id, "Updated identity");
        Ok(updated)
    }

    /// Administrative role re-assignment, optionally changing the coach in the
    /// same step (e.g. clearing it when promoting an athlete to coach).
    pub async fn reassign_role(
        &self,
        actor: &Actor,
        id: IdentityId,
        role: Role,
        coach: CoachChange,
    ) -> Result<Identity> {
        let current = self.load(id).await?;
        require(actor, Action::UpdateIdentity, &Target::Identity(current.subject()))?;

        self.validate_relationship(&Relationship {
            id: Some(id),
            role,
            coach: coach.apply(current.coach),
        })
        .await?;

        // The store refuses to demote a coach that still has athletes.
        let updated = self
            .identities
            .update(id, IdentityUpdate::Role { role, coach })
            .await?;

        tracing::info!(
            identity = id,
            from = %current.role,
            to = %role,
            coach = ?updated.coach,
            by = actor.id,
            "Re-assigned role"
        );
        Ok(updated)
    }

    /// Activate or deactivate. Deactivation revokes outstanding refresh tokens;
    /// access tokens already issued run out on their own.
    pub async fn set_active(&self, actor: &Actor, id: IdentityId, active: bool) -> Result<Identity> {
        let current = self.load(id).await?;
        require(actor, Action::UpdateIdentity, &Target::Identity(current.subject()))?;

        let identity = self
            .identities
            .update(id, IdentityUpdate::Active(active))
            .await?;

        if !active {
            let revoked = self.credentials.revoke_all_for(id).await?;
            tracing::info!(identity = id, revoked, by = actor.id, "Deactivated identity");
        } else {
            tracing::info!(identity = id, by = actor.id, "Activated identity");
        }
        Ok(identity)
    }

    /// Delete an identity under the configured coach-deletion policy.
    ///
    /// Results owned by the identity and sessions it evaluated go with it; its
    /// refresh tokens are revoked.
    pub async fn delete_identity(&self, actor: &Actor, id: IdentityId) -> Result<Deleted> {
        let identity = self.load(id).await?;
        require(actor, Action::DeleteIdentity, &Target::Identity(identity.subject()))?;

        let deleted = self
            .identities
            .delete(id, self.policy.coach_deletion)
            .await
            .inspect_err(|e| tracing::info!(identity = id, error = %e, "Delete refused"))?;
        let purged = self.records.purge_identity(id).await?;
        let revoked = self.credentials.revoke_all_for(id).await?;

        if !deleted.orphaned.is_empty() {
            tracing::warn!(
                coach = id,
                athletes = ?deleted.orphaned,
                "Deleted coach; athletes need a new coach"
            );
        }
        tracing::info!(identity = id, purged, revoked, by = actor.id, "Deleted identity");
        Ok(deleted)
    }

    async fn load(&self, id: IdentityId) -> Result<Identity> {
        self.identities
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("identity {}", id)))
    }
}

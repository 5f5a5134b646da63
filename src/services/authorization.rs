// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authorization decisions.
//!
//! One decision table for every role/action/target combination. Callers resolve
//! only the minimal fields of the target ([`Subject`]) before asking, and must
//! ask before attempting any store mutation.

use crate::error::AppError;
use crate::models::identity::{IdentityId, Role, Subject};
use serde::Serialize;
use std::fmt;

/// The authenticated identity performing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: IdentityId,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    CreateIdentity,
    ReadIdentity,
    ListIdentities,
    UpdateIdentity,
    DeleteIdentity,
    ReadOwnProfile,
    CreateDomainRecord,
    ReadDomainRecord,
    ListDomainRecords,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateIdentity => "create-identity",
            Action::ReadIdentity => "read-identity",
            Action::ListIdentities => "list-identities",
            Action::UpdateIdentity => "update-identity",
            Action::DeleteIdentity => "delete-identity",
            Action::ReadOwnProfile => "read-own-profile",
            Action::CreateDomainRecord => "create-domain-record",
            Action::ReadDomainRecord => "read-domain-record",
            Action::ListDomainRecords => "list-domain-records",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an action is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// No particular record (own profile, creating a new identity).
    None,
    /// The whole identity directory.
    Directory,
    /// The athletes assigned to one coach.
    Roster(IdentityId),
    /// One identity.
    Identity(Subject),
    /// Domain records owned by one athlete.
    AthleteRecords(Subject),
    /// Shared catalog records (tests, evaluation sessions).
    Catalog,
}

/// Why a request was denied. Meant for logs; callers show a generic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DenyReason {
    #[error("{action} requires the admin role")]
    AdminOnly { action: Action },

    #[error("identity {target} is not coached by {actor}")]
    NotCoach { actor: IdentityId, target: IdentityId },

    #[error("identity {actor} may only access its own records, not {target}")]
    NotSelf { actor: IdentityId, target: IdentityId },

    #[error("{action} is not permitted for role {role}")]
    RoleNotPermitted { action: Action, role: Role },

    #[error("{action} does not apply to this target")]
    TargetMismatch { action: Action },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Convert to a `Result` for `?` propagation.
    pub fn into_result(self) -> Result<(), DenyReason> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(reason),
        }
    }
}

/// Decide whether `actor` may perform `action` on `target`.
///
/// Pure and fail-closed: any combination not granted below is denied.
pub fn authorize(actor: &Actor, action: Action, target: &Target) -> Decision {
    use Action::*;

    // Own record is always readable, whatever the role.
    if action == ReadOwnProfile {
        return Decision::Allow;
    }
    if let (ReadIdentity, Target::Identity(subject)) = (action, target) {
        if subject.id == actor.id {
            return Decision::Allow;
        }
    }

    if !target_matches(action, target) {
        return Decision::Deny(DenyReason::TargetMismatch { action });
    }

    if actor.role.outranks_or_equals(Role::Admin) {
        return Decision::Allow;
    }

    match (action, target) {
        (CreateIdentity | UpdateIdentity | DeleteIdentity | CreateDomainRecord, _) => {
            Decision::Deny(DenyReason::AdminOnly { action })
        }
        (ListIdentities, Target::Roster(coach)) if actor.role == Role::Coach => {
            if *coach == actor.id {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::NotCoach {
                    actor: actor.id,
                    target: *coach,
                })
            }
        }
        (ListIdentities, _) => Decision::Deny(DenyReason::AdminOnly { action }),
        (ReadIdentity, Target::Identity(subject))
        | (ReadDomainRecord | ListDomainRecords, Target::AthleteRecords(subject)) => {
            scoped_to_subject(actor, subject)
        }
        (ReadDomainRecord | ListDomainRecords, Target::Catalog) => {
            Decision::Deny(DenyReason::AdminOnly { action })
        }
        _ => Decision::Deny(DenyReason::RoleNotPermitted {
            action,
            role: actor.role,
        }),
    }
}

/// [`authorize`], logging denials and converting them to [`AppError::Denied`].
pub fn require(actor: &Actor, action: Action, target: &Target) -> Result<(), AppError> {
    authorize(actor, action, target).into_result().map_err(|reason| {
        tracing::warn!(
            actor = actor.id,
            role = %actor.role,
            action = %action,
            reason = %reason,
            "Authorization denied"
        );
        AppError::Denied(reason)
    })
}

/// Coaches reach the identities they coach; athletes reach only themselves.
fn scoped_to_subject(actor: &Actor, subject: &Subject) -> Decision {
    match actor.role {
        Role::Coach if subject.coach == Some(actor.id) => Decision::Allow,
        Role::Coach => Decision::Deny(DenyReason::NotCoach {
            actor: actor.id,
            target: subject.id,
        }),
        Role::Athlete if subject.id == actor.id => Decision::Allow,
        Role::Athlete => Decision::Deny(DenyReason::NotSelf {
            actor: actor.id,
            target: subject.id,
        }),
        Role::Admin => Decision::Allow,
    }
}

/// Which targets each action is defined over.
fn target_matches(action: Action, target: &Target) -> bool {
    use Action::*;
    match action {
        CreateIdentity => matches!(target, Target::None),
        ReadIdentity | UpdateIdentity | DeleteIdentity => matches!(target, Target::Identity(_)),
        ListIdentities => matches!(target, Target::Directory | Target::Roster(_)),
        ReadOwnProfile => true,
        CreateDomainRecord => matches!(target, Target::AthleteRecords(_) | Target::Catalog),
        ReadDomainRecord | ListDomainRecords => {
            matches!(target, Target::AthleteRecords(_) | Target::Catalog)
        }
    }
}

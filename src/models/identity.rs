// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity model: roles, coach assignment and the relationship invariants.
//!
//! Every write path (creation, PATCH-style update, role re-assignment) builds the
//! proposed post-state as a [`Relationship`] and runs [`validate`] on it before
//! anything reaches the store.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric identity ID (also used as the store key).
pub type IdentityId = u64;

/// Platform role. Precedence is admin > coach > athlete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Athlete,
    Coach,
    Admin,
}

impl Role {
    /// Least-privileged role, used for self-registration.
    pub const DEFAULT: Role = Role::Athlete;

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Athlete => "athlete",
            Role::Coach => "coach",
            Role::Admin => "admin",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Role::Athlete => 0,
            Role::Coach => 1,
            Role::Admin => 2,
        }
    }

    /// True if this role ranks at or above `other`.
    pub fn outranks_or_equals(&self, other: Role) -> bool {
        self.precedence() >= other.precedence()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "athlete" => Ok(Role::Athlete),
            "coach" => Ok(Role::Coach),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Sport discipline an identity trains or evaluates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Discipline {
    #[default]
    Athletics,
    Soccer,
    Volleyball,
    Basketball,
    Tennis,
    Rugby,
    AmericanFootball,
    Swimming,
    Taekwondo,
    FlagFootball,
    Futsal,
    BeachVolleyball,
    TableTennis,
    MartialArts,
    Boxing,
    PhysicalConditioning,
    GapTraining,
    Investigation,
}

/// Stored identity record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub username: String,
    pub email: String,
    /// PHC-formatted Argon2 digest. Never the plaintext secret.
    #[serde(skip_serializing)]
    pub secret_hash: String,
    pub role: Role,
    /// Lookup reference to the athlete's coach (role = coach).
    pub coach: Option<IdentityId>,
    pub active: bool,
    pub name: String,
    pub discipline: Discipline,
    pub date_of_birth: Option<NaiveDate>,
    pub phone_number: Option<String>,
    pub created_at: String,
}

impl Identity {
    /// The minimal fields authorization decisions need.
    pub fn subject(&self) -> Subject {
        Subject {
            id: self.id,
            role: self.role,
            coach: self.coach,
        }
    }

    pub fn relationship(&self) -> Relationship {
        Relationship {
            id: Some(self.id),
            role: self.role,
            coach: self.coach,
        }
    }
}

/// Minimal projection of an identity: role, id and coach id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject {
    pub id: IdentityId,
    pub role: Role,
    pub coach: Option<IdentityId>,
}

/// Input for creating an identity. The secret is plaintext here and hashed by
/// the identity service before it is stored.
#[derive(Debug, Clone, Deserialize)]
pub struct NewIdentity {
    pub username: String,
    pub email: String,
    pub secret: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub coach: Option<IdentityId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub discipline: Discipline,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// Change to the coach reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "coach")]
pub enum CoachChange {
    #[default]
    Keep,
    Clear,
    Assign(IdentityId),
}

impl CoachChange {
    pub fn apply(self, current: Option<IdentityId>) -> Option<IdentityId> {
        match self {
            CoachChange::Keep => current,
            CoachChange::Clear => None,
            CoachChange::Assign(id) => Some(id),
        }
    }
}

/// PATCH-style change to an identity. Absent fields are left untouched; the
/// optional profile fields are cleared by an explicit `null`.
///
/// `role` is accepted only so a caller that sends it gets a typed rejection;
/// role changes go through the administrative re-assignment action.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityChange {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub coach: CoachChange,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub discipline: Option<Discipline>,
    #[serde(default, deserialize_with = "present")]
    pub date_of_birth: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "present")]
    pub phone_number: Option<Option<String>>,
}

/// Wrap any value that is present in the body, `null` included, so that only
/// a missing field deserializes to `None`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl IdentityChange {
    /// Apply the non-role fields onto a copy of `identity`.
    pub fn apply_to(&self, identity: &Identity) -> Identity {
        let mut next = identity.clone();
        if let Some(username) = &self.username {
            next.username = username.clone();
        }
        if let Some(email) = &self.email {
            next.email = email.clone();
        }
        next.coach = self.coach.apply(identity.coach);
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(discipline) = self.discipline {
            next.discipline = discipline;
        }
        if let Some(date_of_birth) = self.date_of_birth {
            next.date_of_birth = date_of_birth;
        }
        if let Some(phone_number) = &self.phone_number {
            next.phone_number = phone_number.clone();
        }
        next
    }
}

// ─── Relationship Invariants ─────────────────────────────────

/// The part of an identity the relationship invariants constrain.
///
/// `id` is `None` for an identity that has not been stored yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relationship {
    pub id: Option<IdentityId>,
    pub role: Role,
    pub coach: Option<IdentityId>,
}

/// A broken data-model rule. Always reported, never silently corrected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// I1: an athlete must have a coach.
    #[error("an athlete must have a coach assigned")]
    AthleteWithoutCoach,

    /// I1: the referenced coach must exist.
    #[error("assigned coach {0} does not exist")]
    CoachNotFound(IdentityId),

    /// I2: coaches and admins cannot report to a coach.
    #[error("a {0} cannot have a coach assigned")]
    CoachOnNonAthlete(Role),

    /// I3: the referenced identity must have role coach.
    #[error("identity {id} assigned as coach has role {role}, expected coach")]
    CoachRoleMismatch { id: IdentityId, role: Role },

    /// I3: an identity cannot coach itself.
    #[error("an identity cannot be its own coach")]
    SelfAssignment,

    /// I5: role changes require the administrative re-assignment action.
    #[error("role can only be changed through role re-assignment")]
    RoleImmutable,

    /// Deleting this coach would leave athletes without a coach.
    #[error("coach {coach} still has {athletes} assigned athlete(s)")]
    CoachHasAthletes { coach: IdentityId, athletes: usize },
}

/// Check I1-I3 against a proposed post-state.
///
/// `coach_role` resolves the role of the referenced coach (`None` if no such
/// identity exists). Checks run in a fixed order (athlete-coach existence,
/// coach role correctness, no chain/no self) and the first failure wins.
pub fn validate<F>(proposed: &Relationship, coach_role: F) -> Result<(), InvariantViolation>
where
    F: FnOnce(IdentityId) -> Option<Role>,
{
    // Existence: athletes need a coach, and the coach must resolve.
    let resolved = match (proposed.role, proposed.coach) {
        (Role::Athlete, None) => return Err(InvariantViolation::AthleteWithoutCoach),
        (_, None) => None,
        (_, Some(coach_id)) => match coach_role(coach_id) {
            Some(role) => Some((coach_id, role)),
            None => return Err(InvariantViolation::CoachNotFound(coach_id)),
        },
    };

    let Some((coach_id, coach_role)) = resolved else {
        return Ok(());
    };

    // Role correctness.
    if proposed.role != Role::Athlete {
        return Err(InvariantViolation::CoachOnNonAthlete(proposed.role));
    }
    if coach_role != Role::Coach {
        return Err(InvariantViolation::CoachRoleMismatch {
            id: coach_id,
            role: coach_role,
        });
    }

    // No self-assignment.
    if proposed.id == Some(coach_id) {
        return Err(InvariantViolation::SelfAssignment);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn athlete(id: Option<IdentityId>, coach: Option<IdentityId>) -> Relationship {
        Relationship {
            id,
            role: Role::Athlete,
            coach,
        }
    }

    #[test]
    fn athlete_with_coach_is_valid() {
        let result = validate(&athlete(Some(2), Some(1)), |_| Some(Role::Coach));
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn athlete_without_coach_fails_first() {
        let result = validate(&athlete(None, None), |_| panic!("no lookup expected"));
        assert_eq!(result, Err(InvariantViolation::AthleteWithoutCoach));
    }

    #[test]
    fn missing_coach_is_reported() {
        let result = validate(&athlete(None, Some(42)), |_| None);
        assert_eq!(result, Err(InvariantViolation::CoachNotFound(42)));
    }

    #[test]
    fn coach_and_admin_cannot_have_coach() {
        for role in [Role::Coach, Role::Admin] {
            let proposed = Relationship {
                id: Some(5),
                role,
                coach: Some(1),
            };
            let result = validate(&proposed, |_| Some(Role::Coach));
            assert_eq!(result, Err(InvariantViolation::CoachOnNonAthlete(role)));
        }
    }

    #[test]
    fn coach_and_admin_without_coach_are_valid() {
        for role in [Role::Coach, Role::Admin] {
            let proposed = Relationship {
                id: None,
                role,
                coach: None,
            };
            assert_eq!(validate(&proposed, |_| None), Ok(()));
        }
    }

    #[test]
    fn assigned_coach_must_have_coach_role() {
        let result = validate(&athlete(Some(3), Some(7)), |_| Some(Role::Admin));
        assert_eq!(
            result,
            Err(InvariantViolation::CoachRoleMismatch {
                id: 7,
                role: Role::Admin
            })
        );
    }

    #[test]
    fn self_assignment_is_rejected() {
        // A coach being demoted to athlete while pointing at itself: the stored
        // (pre-change) role still reads as coach.
        let result = validate(&athlete(Some(9), Some(9)), |_| Some(Role::Coach));
        assert_eq!(result, Err(InvariantViolation::SelfAssignment));
    }

    #[test]
    fn role_parsing() {
        assert_eq!("Coach".parse::<Role>(), Ok(Role::Coach));
        assert_eq!(" admin ".parse::<Role>(), Ok(Role::Admin));
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn role_precedence() {
        assert!(Role::Admin.outranks_or_equals(Role::Coach));
        assert!(Role::Coach.outranks_or_equals(Role::Athlete));
        assert!(!Role::Athlete.outranks_or_equals(Role::Coach));
    }

    #[test]
    fn change_distinguishes_null_from_absent() {
        let clear: IdentityChange =
            serde_json::from_str(r#"{"phone_number": null, "date_of_birth": null}"#).unwrap();
        assert_eq!(clear.phone_number, Some(None));
        assert_eq!(clear.date_of_birth, Some(None));

        let keep: IdentityChange = serde_json::from_str(r#"{"name": "Ana"}"#).unwrap();
        assert_eq!(keep.phone_number, None);
        assert_eq!(keep.date_of_birth, None);

        let set: IdentityChange =
            serde_json::from_str(r#"{"phone_number": "555-0100"}"#).unwrap();
        assert_eq!(set.phone_number, Some(Some("555-0100".to_string())));
    }

    #[test]
    fn change_applies_coach_patch() {
        assert_eq!(CoachChange::Keep.apply(Some(1)), Some(1));
        assert_eq!(CoachChange::Clear.apply(Some(1)), None);
        assert_eq!(CoachChange::Assign(4).apply(None), Some(4));
    }
}

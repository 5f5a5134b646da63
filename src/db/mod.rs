// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Store layer.
//!
//! The core talks to persistence only through these traits. Uniqueness and
//! revocation are enforced by the store's own atomic primitives
//! (`insert`/`update` and `RevocationStore::add`), never by locks in the services.

pub mod memory;

pub use memory::MemoryStore;

use crate::models::identity::{
    CoachChange, Identity, IdentityChange, IdentityId, InvariantViolation, Role,
};
use crate::models::lab::{
    EvaluationSession, FitnessTest, NewEvaluationSession, NewFitnessTest, NewTestResult, RecordId,
    TestResult,
};
use crate::models::RefreshTokenRecord;
use async_trait::async_trait;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;

/// Store-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{field} '{value}' is already taken")]
    UniquenessViolation { field: &'static str, value: String },

    #[error("{0} not found")]
    NotFound(String),

    /// A rule re-checked inside the store's atomic section failed.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Unique identity attribute.
#[derive(Debug, Clone, Copy)]
pub enum UniqueKey<'a> {
    Username(&'a str),
    Email(&'a str),
}

/// What deleting a coach does to the coach's athletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoachDeletion {
    /// Refuse while any athlete still points at the coach.
    #[default]
    Block,
    /// Null out the athletes' coach in the same atomic step.
    Orphan,
}

impl FromStr for CoachDeletion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(CoachDeletion::Block),
            "orphan" => Ok(CoachDeletion::Orphan),
            other => Err(format!("unknown coach deletion policy '{}'", other)),
        }
    }
}

/// Result of deleting an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deleted {
    /// Athletes whose coach reference was nulled by the delete.
    pub orphaned: Vec<IdentityId>,
}

/// A change to one group of identity fields.
///
/// The store applies it to the row as it is when the write lock is taken, so
/// concurrent updates of different field groups never undo each other.
pub enum IdentityUpdate {
    /// PATCH-style profile and coach change. A role that differs from the
    /// stored role is refused.
    Profile(IdentityChange),
    /// Administrative role re-assignment with its coach change.
    Role { role: Role, coach: CoachChange },
    Active(bool),
    SecretHash(String),
}

/// Durable identity records.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError>;

    async fn exists(&self, key: UniqueKey<'_>) -> Result<bool, StoreError>;

    /// Insert if username and email are unique. The `id` field of `draft` is
    /// ignored; the store assigns one.
    async fn insert(&self, draft: Identity) -> Result<Identity, StoreError>;

    /// Apply `update` to the current row and return the stored result.
    /// Profile and role updates re-check uniqueness and I1-I3 against the rows
    /// as they are inside the atomic section.
    async fn update(&self, id: IdentityId, update: IdentityUpdate)
        -> Result<Identity, StoreError>;

    /// Delete an identity, applying `policy` to any athletes it coaches.
    async fn delete(&self, id: IdentityId, policy: CoachDeletion) -> Result<Deleted, StoreError>;

    async fn list(&self) -> Result<Vec<Identity>, StoreError>;

    async fn athletes_of(&self, coach: IdentityId) -> Result<Vec<Identity>, StoreError>;

    /// Athletes left without a coach by an orphaning delete.
    async fn unassigned_athletes(&self) -> Result<Vec<Identity>, StoreError>;
}

/// Issued refresh tokens and their revocation state.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Record a freshly issued refresh token.
    async fn register(&self, record: RefreshTokenRecord) -> Result<(), StoreError>;

    /// Compare-and-revoke. Returns true only for the call that moved the token
    /// into the revoked state; unknown fingerprints are stored as revoked.
    async fn add(&self, fingerprint: &str, expires_at: i64) -> Result<bool, StoreError>;

    async fn contains(&self, fingerprint: &str) -> Result<bool, StoreError>;

    /// Revoke every outstanding refresh token of an identity. Returns how many
    /// were newly revoked.
    async fn revoke_all_for(&self, identity: IdentityId) -> Result<usize, StoreError>;

    /// Drop records that expired before `cutoff` (Unix seconds). Returns how
    /// many were dropped.
    async fn prune_expired(&self, cutoff: i64) -> Result<usize, StoreError>;
}

/// Domain records gated by the authorization evaluator.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_test(&self, test: NewFitnessTest) -> Result<FitnessTest, StoreError>;
    async fn get_test(&self, id: RecordId) -> Result<Option<FitnessTest>, StoreError>;
    async fn list_tests(&self) -> Result<Vec<FitnessTest>, StoreError>;
    async fn update_test(&self, test: &FitnessTest) -> Result<(), StoreError>;
    /// Deletes the test and its results.
    async fn delete_test(&self, id: RecordId) -> Result<(), StoreError>;

    async fn insert_session(
        &self,
        evaluator: IdentityId,
        session: NewEvaluationSession,
    ) -> Result<EvaluationSession, StoreError>;
    async fn get_session(&self, id: RecordId) -> Result<Option<EvaluationSession>, StoreError>;
    async fn list_sessions(&self) -> Result<Vec<EvaluationSession>, StoreError>;

    /// Insert if (athlete, test, session) is unique.
    async fn insert_result(&self, result: NewTestResult) -> Result<TestResult, StoreError>;
    async fn get_result(&self, id: RecordId) -> Result<Option<TestResult>, StoreError>;
    async fn results_for_athlete(&self, athlete: IdentityId)
        -> Result<Vec<TestResult>, StoreError>;

    /// Remove results owned by an identity and sessions it evaluated.
    async fn purge_identity(&self, id: IdentityId) -> Result<usize, StoreError>;
}

/// Store handles shared across the services.
#[derive(Clone)]
pub struct Stores {
    pub identities: Arc<dyn IdentityStore>,
    pub revocations: Arc<dyn RevocationStore>,
    pub records: Arc<dyn RecordStore>,
}

impl Stores {
    /// All three stores backed by one in-memory instance.
    pub fn in_memory() -> Self {
        let store = MemoryStore::new();
        Self {
            identities: Arc::new(store.clone()),
            revocations: Arc::new(store.clone()),
            records: Arc::new(store),
        }
    }
}

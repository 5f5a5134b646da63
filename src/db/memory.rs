// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store.
//!
//! Identities and domain records live behind one `RwLock` each so that
//! insert-if-unique, update and delete are single atomic sections. Refresh
//! token state lives in a `DashMap`; the entry API gives compare-and-revoke.

use super::{
    CoachDeletion, Deleted, IdentityStore, IdentityUpdate, RecordStore, RevocationStore,
    StoreError, UniqueKey,
};
use crate::models::identity::{self, Identity, IdentityId, InvariantViolation, Role};
use crate::models::lab::{
    EvaluationSession, FitnessTest, NewEvaluationSession, NewFitnessTest, NewTestResult, RecordId,
    TestResult,
};
use crate::models::RefreshTokenRecord;
use crate::time_utils::now_rfc3339;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory implementation of every store trait.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    identities: RwLock<IdentityTable>,
    records: RwLock<RecordTable>,
    refresh_tokens: DashMap<String, RefreshTokenRecord>,
}

#[derive(Default)]
struct IdentityTable {
    last_id: IdentityId,
    rows: BTreeMap<IdentityId, Identity>,
    by_username: HashMap<String, IdentityId>,
    by_email: HashMap<String, IdentityId>,
}

fn email_key(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

impl IdentityTable {
    fn check_unique(
        &self,
        username: &str,
        email: &str,
        except: Option<IdentityId>,
    ) -> Result<(), StoreError> {
        if let Some(owner) = self.by_username.get(username) {
            if Some(*owner) != except {
                return Err(StoreError::UniquenessViolation {
                    field: "username",
                    value: username.to_string(),
                });
            }
        }
        if let Some(owner) = self.by_email.get(&email_key(email)) {
            if Some(*owner) != except {
                return Err(StoreError::UniquenessViolation {
                    field: "email",
                    value: email.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Re-check the coach reference against current rows.
    fn check_coach(&self, identity: &Identity) -> Result<(), StoreError> {
        let Some(coach_id) = identity.coach else {
            return Ok(());
        };
        if coach_id == identity.id {
            return Err(InvariantViolation::SelfAssignment.into());
        }
        match self.rows.get(&coach_id) {
            None => Err(InvariantViolation::CoachNotFound(coach_id).into()),
            Some(coach) if coach.role != Role::Coach => Err(InvariantViolation::CoachRoleMismatch {
                id: coach_id,
                role: coach.role,
            }
            .into()),
            Some(_) => Ok(()),
        }
    }

    /// Check a proposed post-state of a stored row against the current rows.
    fn check_replacement(&self, current: &Identity, next: &Identity) -> Result<(), StoreError> {
        self.check_unique(&next.username, &next.email, Some(next.id))?;
        identity::validate(&next.relationship(), |coach_id| {
            self.rows.get(&coach_id).map(|coach| coach.role)
        })?;

        if current.role == Role::Coach && next.role != Role::Coach {
            let athletes = self.athletes_of(next.id).count();
            if athletes > 0 {
                return Err(InvariantViolation::CoachHasAthletes {
                    coach: next.id,
                    athletes,
                }
                .into());
            }
        }
        Ok(())
    }

    fn replace(&mut self, current: &Identity, next: Identity) {
        if current.username != next.username {
            self.by_username.remove(&current.username);
            self.by_username.insert(next.username.clone(), next.id);
        }
        if email_key(&current.email) != email_key(&next.email) {
            self.by_email.remove(&email_key(&current.email));
            self.by_email.insert(email_key(&next.email), next.id);
        }
        self.rows.insert(next.id, next);
    }

    fn athletes_of(&self, coach: IdentityId) -> impl Iterator<Item = &Identity> {
        self.rows
            .values()
            .filter(move |identity| identity.coach == Some(coach))
    }
}

#[derive(Default)]
struct RecordTable {
    last_id: RecordId,
    tests: BTreeMap<RecordId, FitnessTest>,
    sessions: BTreeMap<RecordId, EvaluationSession>,
    results: BTreeMap<RecordId, TestResult>,
}

impl RecordTable {
    fn next_id(&mut self) -> RecordId {
        self.last_id += 1;
        self.last_id
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>, StoreError> {
        Ok(self.inner.identities.read().await.rows.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError> {
        let table = self.inner.identities.read().await;
        Ok(table
            .by_username
            .get(username)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn exists(&self, key: UniqueKey<'_>) -> Result<bool, StoreError> {
        let table = self.inner.identities.read().await;
        Ok(match key {
            UniqueKey::Username(username) => table.by_username.contains_key(username),
            UniqueKey::Email(email) => table.by_email.contains_key(&email_key(email)),
        })
    }

    async fn insert(&self, mut draft: Identity) -> Result<Identity, StoreError> {
        let mut table = self.inner.identities.write().await;
        table.check_unique(&draft.username, &draft.email, None)?;

        table.last_id += 1;
        draft.id = table.last_id;
        table.check_coach(&draft)?;

        table.by_username.insert(draft.username.clone(), draft.id);
        table.by_email.insert(email_key(&draft.email), draft.id);
        table.rows.insert(draft.id, draft.clone());
        Ok(draft)
    }

    async fn update(
        &self,
        id: IdentityId,
        update: IdentityUpdate,
    ) -> Result<Identity, StoreError> {
        let mut table = self.inner.identities.write().await;
        let row = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("identity {}", id)))?;

        let next = match update {
            IdentityUpdate::Active(active) => {
                row.active = active;
                return Ok(row.clone());
            }
            IdentityUpdate::SecretHash(secret_hash) => {
                row.secret_hash = secret_hash;
                return Ok(row.clone());
            }
            IdentityUpdate::Profile(change) => {
                if change.role.is_some_and(|role| role != row.role) {
                    return Err(InvariantViolation::RoleImmutable.into());
                }
                change.apply_to(row)
            }
            IdentityUpdate::Role { role, coach } => {
                let mut next = row.clone();
                next.role = role;
                next.coach = coach.apply(row.coach);
                next
            }
        };

        let current = row.clone();
        table.check_replacement(&current, &next)?;
        table.replace(&current, next.clone());
        Ok(next)
    }

    async fn delete(&self, id: IdentityId, policy: CoachDeletion) -> Result<Deleted, StoreError> {
        let mut table = self.inner.identities.write().await;
        if !table.rows.contains_key(&id) {
            return Err(StoreError::NotFound(format!("identity {}", id)));
        }

        let athletes: Vec<IdentityId> = table.athletes_of(id).map(|a| a.id).collect();
        if !athletes.is_empty() && policy == CoachDeletion::Block {
            return Err(InvariantViolation::CoachHasAthletes {
                coach: id,
                athletes: athletes.len(),
            }
            .into());
        }
        for athlete_id in &athletes {
            if let Some(athlete) = table.rows.get_mut(athlete_id) {
                athlete.coach = None;
            }
        }

        if let Some(removed) = table.rows.remove(&id) {
            table.by_username.remove(&removed.username);
            table.by_email.remove(&email_key(&removed.email));
        }

        Ok(Deleted { orphaned: athletes })
    }

    async fn list(&self) -> Result<Vec<Identity>, StoreError> {
        Ok(self
            .inner
            .identities
            .read()
            .await
            .rows
            .values()
            .cloned()
            .collect())
    }

    async fn athletes_of(&self, coach: IdentityId) -> Result<Vec<Identity>, StoreError> {
        let table = self.inner.identities.read().await;
        Ok(table.athletes_of(coach).cloned().collect())
    }

    async fn unassigned_athletes(&self) -> Result<Vec<Identity>, StoreError> {
        let table = self.inner.identities.read().await;
        Ok(table
            .rows
            .values()
            .filter(|identity| identity.role == Role::Athlete && identity.coach.is_none())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RevocationStore for MemoryStore {
    async fn register(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        self.inner
            .refresh_tokens
            .insert(record.fingerprint.clone(), record);
        Ok(())
    }

    async fn add(&self, fingerprint: &str, expires_at: i64) -> Result<bool, StoreError> {
        // The entry guard holds the shard lock, so check-and-set is atomic.
        match self.inner.refresh_tokens.entry(fingerprint.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().revoked {
                    Ok(false)
                } else {
                    entry.get_mut().revoked = true;
                    Ok(true)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(RefreshTokenRecord {
                    fingerprint: fingerprint.to_string(),
                    identity: None,
                    expires_at,
                    revoked: true,
                });
                Ok(true)
            }
        }
    }

    async fn contains(&self, fingerprint: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .refresh_tokens
            .get(fingerprint)
            .map(|record| record.revoked)
            .unwrap_or(false))
    }

    async fn revoke_all_for(&self, identity: IdentityId) -> Result<usize, StoreError> {
        let mut revoked = 0;
        for mut record in self.inner.refresh_tokens.iter_mut() {
            if record.identity == Some(identity) && !record.revoked {
                record.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn prune_expired(&self, cutoff: i64) -> Result<usize, StoreError> {
        let before = self.inner.refresh_tokens.len();
        self.inner
            .refresh_tokens
            .retain(|_, record| record.expires_at >= cutoff);
        Ok(before.saturating_sub(self.inner.refresh_tokens.len()))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_test(&self, test: NewFitnessTest) -> Result<FitnessTest, StoreError> {
        let mut table = self.inner.records.write().await;
        let record = FitnessTest {
            id: table.next_id(),
            name: test.name,
            category: test.category,
            description: test.description,
            unit: test.unit,
            higher_is_better: test.higher_is_better,
        };
        table.tests.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_test(&self, id: RecordId) -> Result<Option<FitnessTest>, StoreError> {
        Ok(self.inner.records.read().await.tests.get(&id).cloned())
    }

    async fn list_tests(&self) -> Result<Vec<FitnessTest>, StoreError> {
        Ok(self
            .inner
            .records
            .read()
            .await
            .tests
            .values()
            .cloned()
            .collect())
    }

    async fn update_test(&self, test: &FitnessTest) -> Result<(), StoreError> {
        let mut table = self.inner.records.write().await;
        match table.tests.get_mut(&test.id) {
            Some(existing) => {
                *existing = test.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("test {}", test.id))),
        }
    }

    async fn delete_test(&self, id: RecordId) -> Result<(), StoreError> {
        let mut table = self.inner.records.write().await;
        if table.tests.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("test {}", id)));
        }
        table.results.retain(|_, result| result.test != id);
        Ok(())
    }

    async fn insert_session(
        &self,
        evaluator: IdentityId,
        session: NewEvaluationSession,
    ) -> Result<EvaluationSession, StoreError> {
        let mut table = self.inner.records.write().await;
        let record = EvaluationSession {
            id: table.next_id(),
            date: session.date,
            location: session.location,
            discipline: session.discipline,
            evaluator,
            notes: session.notes,
        };
        table.sessions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_session(&self, id: RecordId) -> Result<Option<EvaluationSession>, StoreError> {
        Ok(self.inner.records.read().await.sessions.get(&id).cloned())
    }

    async fn list_sessions(&self) -> Result<Vec<EvaluationSession>, StoreError> {
        Ok(self
            .inner
            .records
            .read()
            .await
            .sessions
            .values()
            .cloned()
            .collect())
    }

    async fn insert_result(&self, result: NewTestResult) -> Result<TestResult, StoreError> {
        let mut table = self.inner.records.write().await;
        if !table.tests.contains_key(&result.test) {
            return Err(StoreError::NotFound(format!("test {}", result.test)));
        }
        if !table.sessions.contains_key(&result.session) {
            return Err(StoreError::NotFound(format!("session {}", result.session)));
        }
        let duplicate = table.results.values().any(|existing| {
            existing.athlete == result.athlete
                && existing.test == result.test
                && existing.session == result.session
        });
        if duplicate {
            return Err(StoreError::UniquenessViolation {
                field: "result",
                value: format!(
                    "athlete {} / test {} / session {}",
                    result.athlete, result.test, result.session
                ),
            });
        }

        let record = TestResult {
            id: table.next_id(),
            athlete: result.athlete,
            test: result.test,
            session: result.session,
            numeric_value: result.numeric_value,
            notes: result.notes,
            recorded_at: now_rfc3339(),
        };
        table.results.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_result(&self, id: RecordId) -> Result<Option<TestResult>, StoreError> {
        Ok(self.inner.records.read().await.results.get(&id).cloned())
    }

    async fn results_for_athlete(
        &self,
        athlete: IdentityId,
    ) -> Result<Vec<TestResult>, StoreError> {
        Ok(self
            .inner
            .records
            .read()
            .await
            .results
            .values()
            .filter(|result| result.athlete == athlete)
            .cloned()
            .collect())
    }

    async fn purge_identity(&self, id: IdentityId) -> Result<usize, StoreError> {
        let mut table = self.inner.records.write().await;
        let sessions: Vec<RecordId> = table
            .sessions
            .values()
            .filter(|session| session.evaluator == id)
            .map(|session| session.id)
            .collect();

        let before = table.results.len() + table.sessions.len();
        table
            .results
            .retain(|_, result| result.athlete != id && !sessions.contains(&result.session));
        table.sessions.retain(|_, session| session.evaluator != id);
        Ok(before - (table.results.len() + table.sessions.len()))
    }
}

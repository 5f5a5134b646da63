// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Test catalog, evaluation sessions and athlete results.

use crate::db::{IdentityStore, RecordStore};
use crate::error::{AppError, Result};
use crate::models::identity::{IdentityId, Role, Subject};
use crate::models::lab::{
    EvaluationSession, FitnessTest, FitnessTestChange, NewEvaluationSession, NewFitnessTest,
    NewTestResult, RecordId, TestResult,
};
use crate::services::authorization::{require, Action, Actor, Target};
use std::sync::Arc;

pub struct LabService {
    identities: Arc<dyn IdentityStore>,
    records: Arc<dyn RecordStore>,
}

impl LabService {
    pub fn new(identities: Arc<dyn IdentityStore>, records: Arc<dyn RecordStore>) -> Self {
        Self {
            identities,
            records,
        }
    }

    // ─── Test catalog ────────────────────────────────────────

    pub async fn create_test(&self, actor: &Actor, test: NewFitnessTest) -> Result<FitnessTest> {
        require(actor, Action::CreateDomainRecord, &Target::Catalog)?;
        let created = self.records.insert_test(test).await?;
        tracing::info!(test = created.id, name = %created.name, "Created fitness test");
        Ok(created)
    }

    pub async fn list_tests(&self, actor: &Actor) -> Result<Vec<FitnessTest>> {
        require(actor, Action::ListDomainRecords, &Target::Catalog)?;
        Ok(self.records.list_tests().await?)
    }

    pub async fn get_test(&self, actor: &Actor, id: RecordId) -> Result<FitnessTest> {
        require(actor, Action::ReadDomainRecord, &Target::Catalog)?;
        self.load_test(id).await
    }

    pub async fn update_test(
        &self,
        actor: &Actor,
        id: RecordId,
        change: FitnessTestChange,
    ) -> Result<FitnessTest> {
        require(actor, Action::CreateDomainRecord, &Target::Catalog)?;
        let mut test = self.load_test(id).await?;
        change.apply_to(&mut test);
        self.records.update_test(&test).await?;
        Ok(test)
    }

    /// Deletes the test together with its results.
    pub async fn delete_test(&self, actor: &Actor, id: RecordId) -> Result<()> {
        require(actor, Action::CreateDomainRecord, &Target::Catalog)?;
        self.records.delete_test(id).await?;
        tracing::info!(test = id, by = actor.id, "Deleted fitness test");
        Ok(())
    }

    async fn load_test(&self, id: RecordId) -> Result<FitnessTest> {
        self.records
            .get_test(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("test {}", id)))
    }

    // ─── Evaluation sessions ─────────────────────────────────

    /// Open a session with the actor as evaluator.
    pub async fn create_session(
        &self,
        actor: &Actor,
        session: NewEvaluationSession,
    ) -> Result<EvaluationSession> {
        require(actor, Action::CreateDomainRecord, &Target::Catalog)?;
        let created = self.records.insert_session(actor.id, session).await?;
        tracing::info!(session = created.id, evaluator = actor.id, "Created evaluation session");
        Ok(created)
    }

    pub async fn list_sessions(&self, actor: &Actor) -> Result<Vec<EvaluationSession>> {
        require(actor, Action::ListDomainRecords, &Target::Catalog)?;
        Ok(self.records.list_sessions().await?)
    }

    // ─── Results ─────────────────────────────────────────────

    pub async fn record_result(&self, actor: &Actor, result: NewTestResult) -> Result<TestResult> {
        let athlete = self.subject(result.athlete).await?;
        require(
            actor,
            Action::CreateDomainRecord,
            &Target::AthleteRecords(athlete),
        )?;
        if athlete.role != Role::Athlete {
            return Err(AppError::BadRequest(format!(
                "identity {} is a {}, results can only be recorded for athletes",
                athlete.id, athlete.role
            )));
        }

        let recorded = self.records.insert_result(result).await?;
        tracing::info!(
            result = recorded.id,
            athlete = recorded.athlete,
            test = recorded.test,
            session = recorded.session,
            "Recorded test result"
        );
        Ok(recorded)
    }

    /// Read one result; access follows the athlete who owns it.
    pub async fn get_result(&self, actor: &Actor, id: RecordId) -> Result<TestResult> {
        let result = self
            .records
            .get_result(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("result {}", id)))?;
        let athlete = self.subject(result.athlete).await?;
        require(actor, Action::ReadDomainRecord, &Target::AthleteRecords(athlete))?;
        Ok(result)
    }

    pub async fn results_for_athlete(
        &self,
        actor: &Actor,
        athlete_id: IdentityId,
    ) -> Result<Vec<TestResult>> {
        let athlete = self.subject(athlete_id).await?;
        require(actor, Action::ListDomainRecords, &Target::AthleteRecords(athlete))?;
        Ok(self.records.results_for_athlete(athlete_id).await?)
    }

    /// Resolve only the fields authorization needs.
    async fn subject(&self, id: IdentityId) -> Result<Subject> {
        self.identities
            .find_by_id(id)
            .await?
            .map(|identity| identity.subject())
            .ok_or_else(|| AppError::NotFound(format!("identity {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Stores;
    use crate::models::identity::{Identity, NewIdentity};
    use crate::models::lab::{Category, Unit};
    use crate::AppState;
    use chrono::NaiveDate;

    const ROOT: Actor = Actor {
        id: 999,
        role: Role::Admin,
    };

    struct Fixture {
        state: AppState,
        c1: Identity,
        c2: Identity,
        athlete: Identity,
        result: TestResult,
    }

    fn as_actor(identity: &Identity) -> Actor {
        Actor {
            id: identity.id,
            role: identity.role,
        }
    }

    async fn create(
        state: &AppState,
        username: &str,
        role: Role,
        coach: Option<IdentityId>,
    ) -> Identity {
        state
            .identity_service
            .create_identity(
                Some(&ROOT),
                NewIdentity {
                    username: username.to_string(),
                    email: format!("{}@example.com", username),
                    secret: "pw".to_string(),
                    role: Some(role),
                    coach,
                    name: String::new(),
                    discipline: Default::default(),
                    date_of_birth: None,
                    phone_number: None,
                },
            )
            .await
            .unwrap()
    }

    async fn fixture() -> Fixture {
        let state = AppState::new(Config::test_default(), Stores::in_memory()).unwrap();
        let c1 = create(&state, "c1", Role::Coach, None).await;
        let c2 = create(&state, "c2", Role::Coach, None).await;
        let athlete = create(&state, "a", Role::Athlete, Some(c2.id)).await;

        let lab = &state.lab_service;
        let test = lab
            .create_test(
                &ROOT,
                NewFitnessTest {
                    name: "30m sprint".to_string(),
                    category: Category::Speed,
                    description: String::new(),
                    unit: Unit::Seconds,
                    higher_is_better: false,
                },
            )
            .await
            .unwrap();
        let session = lab
            .create_session(
                &ROOT,
                NewEvaluationSession {
                    date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
                    location: "Track".to_string(),
                    discipline: Default::default(),
                    notes: String::new(),
                },
            )
            .await
            .unwrap();
        let result = lab
            .record_result(
                &ROOT,
                NewTestResult {
                    athlete: athlete.id,
                    test: test.id,
                    session: session.id,
                    numeric_value: 4.2,
                    notes: String::new(),
                },
            )
            .await
            .unwrap();

        Fixture {
            state,
            c1,
            c2,
            athlete,
            result,
        }
    }

    #[tokio::test]
    async fn test_only_assigned_coach_sees_results() {
        let f = fixture().await;
        let lab = &f.state.lab_service;

        assert!(matches!(
            lab.results_for_athlete(&as_actor(&f.c1), f.athlete.id).await,
            Err(AppError::Denied(_))
        ));
        assert_eq!(
            lab.results_for_athlete(&as_actor(&f.c2), f.athlete.id)
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(lab.get_result(&as_actor(&f.c2), f.result.id).await.is_ok());
        assert!(lab.get_result(&as_actor(&f.c1), f.result.id).await.is_err());
    }

    #[tokio::test]
    async fn test_athlete_sees_only_own_results() {
        let f = fixture().await;
        let lab = &f.state.lab_service;
        let other = create(&f.state, "b", Role::Athlete, Some(f.c1.id)).await;

        assert!(lab
            .results_for_athlete(&as_actor(&f.athlete), f.athlete.id)
            .await
            .is_ok());
        assert!(matches!(
            lab.results_for_athlete(&as_actor(&other), f.athlete.id).await,
            Err(AppError::Denied(_))
        ));
    }

    #[tokio::test]
    async fn test_writes_are_admin_only() {
        let f = fixture().await;
        let lab = &f.state.lab_service;

        let err = lab
            .record_result(
                &as_actor(&f.c2),
                NewTestResult {
                    athlete: f.athlete.id,
                    test: f.result.test,
                    session: f.result.session,
                    numeric_value: 4.0,
                    notes: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Denied(_)));

        assert!(matches!(
            lab.list_tests(&as_actor(&f.c2)).await,
            Err(AppError::Denied(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_result_conflicts() {
        let f = fixture().await;
        let err = f
            .state
            .lab_service
            .record_result(
                &ROOT,
                NewTestResult {
                    athlete: f.athlete.id,
                    test: f.result.test,
                    session: f.result.session,
                    numeric_value: 4.0,
                    notes: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UniquenessViolation { .. }));
    }

    #[tokio::test]
    async fn test_results_only_for_athletes() {
        let f = fixture().await;
        let err = f
            .state
            .lab_service
            .record_result(
                &ROOT,
                NewTestResult {
                    athlete: f.c1.id,
                    test: f.result.test,
                    session: f.result.session,
                    numeric_value: 1.0,
                    notes: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_deleting_test_removes_results() {
        let f = fixture().await;
        let lab = &f.state.lab_service;
        lab.delete_test(&ROOT, f.result.test).await.unwrap();

        assert!(matches!(
            lab.get_result(&ROOT, f.result.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Test catalog, evaluation session and result routes.

use crate::error::Result;
use crate::models::identity::IdentityId;
use crate::models::lab::{
    EvaluationSession, FitnessTest, FitnessTestChange, NewEvaluationSession, NewFitnessTest,
    NewTestResult, RecordId, TestResult,
};
use crate::services::Actor;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tests", get(list_tests).post(create_test))
        .route(
            "/api/tests/{id}",
            get(get_test).patch(update_test).delete(delete_test),
        )
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/results", post(record_result))
        .route("/api/results/{id}", get(get_result))
        .route("/api/athletes/{id}/results", get(athlete_results))
}

// ─── Test Catalog ────────────────────────────────────────────

async fn list_tests(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<FitnessTest>>> {
    Ok(Json(state.lab_service.list_tests(&actor).await?))
}

async fn create_test(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(test): Json<NewFitnessTest>,
) -> Result<(StatusCode, Json<FitnessTest>)> {
    let created = state.lab_service.create_test(&actor, test).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_test(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<RecordId>,
) -> Result<Json<FitnessTest>> {
    Ok(Json(state.lab_service.get_test(&actor, id).await?))
}

async fn update_test(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<RecordId>,
    Json(change): Json<FitnessTestChange>,
) -> Result<Json<FitnessTest>> {
    Ok(Json(state.lab_service.update_test(&actor, id, change).await?))
}

async fn delete_test(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<RecordId>,
) -> Result<StatusCode> {
    state.lab_service.delete_test(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Evaluation Sessions ─────────────────────────────────────

async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<EvaluationSession>>> {
    Ok(Json(state.lab_service.list_sessions(&actor).await?))
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(session): Json<NewEvaluationSession>,
) -> Result<(StatusCode, Json<EvaluationSession>)> {
    let created = state.lab_service.create_session(&actor, session).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

// ─── Results ─────────────────────────────────────────────────

async fn record_result(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(result): Json<NewTestResult>,
) -> Result<(StatusCode, Json<TestResult>)> {
    let recorded = state.lab_service.record_result(&actor, result).await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

async fn get_result(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<RecordId>,
) -> Result<Json<TestResult>> {
    Ok(Json(state.lab_service.get_result(&actor, id).await?))
}

async fn athlete_results(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(athlete_id): Path<IdentityId>,
) -> Result<Json<Vec<TestResult>>> {
    Ok(Json(
        state
            .lab_service
            .results_for_athlete(&actor, athlete_id)
            .await?,
    ))
}

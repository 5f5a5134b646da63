// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity routes for authenticated users.

use crate::error::Result;
use crate::models::identity::{
    CoachChange, Identity, IdentityChange, IdentityId, NewIdentity, Role,
};
use crate::services::Actor;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identity routes (require authentication).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/profile", get(get_profile))
        .route("/api/profile/password", post(change_password))
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/unassigned", get(unassigned_athletes))
        .route(
            "/api/users/{id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/api/users/{id}/role", put(reassign_role))
        .route("/api/users/{id}/active", put(set_active))
        .route("/api/coaches/{id}/athletes", get(coach_roster))
}

// ─── Own Profile ─────────────────────────────────────────────

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Identity>> {
    Ok(Json(state.identity_service.read_profile(&actor).await?))
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Change the caller's password. Outstanding refresh tokens are revoked.
async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<StatusCode> {
    state
        .session_service
        .change_secret(&actor, &req.current_password, &req.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Directory ───────────────────────────────────────────────

async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<Identity>>> {
    Ok(Json(state.identity_service.list_identities(&actor).await?))
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(new): Json<NewIdentity>,
) -> Result<(StatusCode, Json<Identity>)> {
    let identity = state
        .identity_service
        .create_identity(Some(&actor), new)
        .await?;
    Ok((StatusCode::CREATED, Json(identity)))
}

async fn unassigned_athletes(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<Identity>>> {
    Ok(Json(
        state.identity_service.unassigned_athletes(&actor).await?,
    ))
}

async fn coach_roster(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(coach_id): Path<IdentityId>,
) -> Result<Json<Vec<Identity>>> {
    Ok(Json(state.identity_service.roster(&actor, coach_id).await?))
}

// ─── Single Identity ─────────────────────────────────────────

async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<IdentityId>,
) -> Result<Json<Identity>> {
    Ok(Json(state.identity_service.get_identity(&actor, id).await?))
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<IdentityId>,
    Json(change): Json<IdentityChange>,
) -> Result<Json<Identity>> {
    Ok(Json(
        state
            .identity_service
            .update_identity(&actor, id, change)
            .await?,
    ))
}

#[derive(Serialize)]
pub struct DeleteUserResponse {
    pub deleted: IdentityId,
    /// Athletes left without a coach by the delete.
    pub orphaned: Vec<IdentityId>,
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<IdentityId>,
) -> Result<Json<DeleteUserResponse>> {
    let deleted = state.identity_service.delete_identity(&actor, id).await?;
    Ok(Json(DeleteUserResponse {
        deleted: id,
        orphaned: deleted.orphaned,
    }))
}

#[derive(Deserialize)]
pub struct RoleRequest {
    pub role: Role,
    #[serde(default)]
    pub coach: CoachChange,
}

async fn reassign_role(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<IdentityId>,
    Json(req): Json<RoleRequest>,
) -> Result<Json<Identity>> {
    Ok(Json(
        state
            .identity_service
            .reassign_role(&actor, id, req.role, req.coach)
            .await?,
    ))
}

#[derive(Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

async fn set_active(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<IdentityId>,
    Json(req): Json<ActiveRequest>,
) -> Result<Json<Identity>> {
    Ok(Json(
        state
            .identity_service
            .set_active(&actor, id, req.active)
            .await?,
    ))
}

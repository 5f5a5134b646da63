// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::db::StoreError;
use crate::models::identity::InvariantViolation;
use crate::services::authorization::DenyReason;
use crate::services::credentials::CredentialError;
use crate::services::secrets::SecretError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Identity is inactive")]
    Inactive,

    #[error("Credential expired")]
    Expired,

    #[error("Credential revoked")]
    Revoked,

    #[error("Malformed credential")]
    Malformed,

    #[error("Denied: {0}")]
    Denied(#[from] DenyReason),

    #[error("Invariant violation: {0}")]
    InvariantViolation(#[from] InvariantViolation),

    #[error("{field} '{value}' is already taken")]
    UniquenessViolation { field: &'static str, value: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniquenessViolation { field, value } => {
                AppError::UniquenessViolation { field, value }
            }
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::Invariant(violation) => AppError::InvariantViolation(violation),
            StoreError::Unavailable(msg) => AppError::Database(msg),
        }
    }
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Expired => AppError::Expired,
            CredentialError::Revoked => AppError::Revoked,
            CredentialError::Malformed => AppError::Malformed,
            CredentialError::Inactive => AppError::Inactive,
            CredentialError::Store(e) => e.into(),
            other => AppError::Internal(anyhow::anyhow!(other)),
        }
    }
}

impl From<SecretError> for AppError {
    fn from(err: SecretError) -> Self {
        AppError::Internal(anyhow::anyhow!(err))
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            // Same body for both so a login response never says which part failed.
            AppError::InvalidCredentials | AppError::Inactive => {
                (StatusCode::UNAUTHORIZED, "invalid_credentials", None)
            }
            AppError::Expired => (StatusCode::UNAUTHORIZED, "token_expired", None),
            AppError::Revoked => (StatusCode::UNAUTHORIZED, "token_revoked", None),
            AppError::Malformed => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::Denied(reason) => {
                tracing::debug!(reason = %reason, "Request denied");
                (StatusCode::FORBIDDEN, "forbidden", None)
            }
            AppError::InvariantViolation(violation) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invariant_violation",
                Some(violation.to_string()),
            ),
            AppError::UniquenessViolation { .. } => {
                (StatusCode::CONFLICT, "conflict", Some(self.to_string()))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

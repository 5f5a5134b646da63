// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access-token authentication middleware.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// Cookie carrying the access token for browser clients.
pub const ACCESS_COOKIE: &str = "lab_access";

/// Middleware that requires a valid access token.
///
/// The check is stateless (signature and expiry only). On success the
/// [`Actor`](crate::services::Actor) is added to the request extensions.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Try cookie first, then header
    let token = if let Some(cookie) = jar.get(ACCESS_COOKIE) {
        cookie.value().to_string()
    } else {
        let auth_header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) => token.to_string(),
            None => return Err(AppError::Unauthorized),
        }
    };

    let actor = state.credentials.verify_access(&token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        AppError::from(e)
    })?;
    request.extensions_mut().insert(actor);

    Ok(next.run(request).await)
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Login, token refresh, logout and self-registration routes.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::middleware::ACCESS_COOKIE;
use crate::models::{Credential, Identity, NewIdentity};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/token", post(login))
        .route("/auth/token/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/register", post(register))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Deserialize)]
pub struct LogoutRequest {
    /// Refresh token to revoke. Logging out without one only clears the cookie.
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Cookies are marked Secure unless the frontend is served over plain http.
fn secure_cookies(config: &Config) -> bool {
    config.frontend_url.starts_with("https://")
}

fn access_cookie(config: &Config, value: String) -> Cookie<'static> {
    Cookie::build((ACCESS_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure_cookies(config))
        .build()
}

/// Exchange username and password for a credential pair.
///
/// Wrong password, unknown username and inactive identity all produce the
/// same response.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<Credential>)> {
    let credential = state
        .session_service
        .authenticate(&req.username, &req.password)
        .await?;

    let jar = jar.add(access_cookie(&state.config, credential.access.clone()));
    Ok((jar, Json(credential)))
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<RefreshRequest>,
) -> Result<(CookieJar, Json<Credential>)> {
    let credential = state.session_service.refresh_credential(&req.refresh).await?;

    let jar = jar.add(access_cookie(&state.config, credential.access.clone()));
    Ok((jar, Json(credential)))
}

/// Revoke the presented refresh token and clear the access cookie.
///
/// Always succeeds, whether or not the token was known.
async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LogoutRequest>,
) -> Result<(StatusCode, CookieJar)> {
    if let Some(token) = req.refresh {
        state.session_service.revoke_credential(&token).await?;
    }

    // Removal must carry the same attributes the cookie was set with.
    let removal = Cookie::build(ACCESS_COOKIE)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure_cookies(&state.config));
    Ok((StatusCode::NO_CONTENT, jar.remove(removal)))
}

/// Self-registration. Disabled unless `ALLOW_SELF_REGISTRATION` is set.
async fn register(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewIdentity>,
) -> Result<(StatusCode, Json<Identity>)> {
    let identity = state.identity_service.create_identity(None, new).await?;
    Ok((StatusCode::CREATED, Json(identity)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_cookie_attributes() {
        let mut config = Config::test_default();
        let cookie = access_cookie(&config, "tok".to_string());
        assert_eq!(cookie.name(), ACCESS_COOKIE);
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.secure(), Some(false));

        config.frontend_url = "https://lab.example.com".to_string();
        assert_eq!(access_cookie(&config, "tok".to_string()).secure(), Some(true));
    }
}

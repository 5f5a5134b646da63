// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use training_lab::config::{BootstrapAdmin, Config};
use training_lab::db::{IdentityStore, Stores};
use training_lab::models::identity::{Identity, IdentityId, NewIdentity, Role};
use training_lab::routes::create_router;
use training_lab::services::Actor;
use training_lab::AppState;

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-password";
pub const PASSWORD: &str = "training-pass";

/// Create a test app over in-memory stores with a bootstrap admin.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub async fn create_test_app() -> (Router, Arc<AppState>) {
    create_test_app_with(Config::test_default()).await
}

#[allow(dead_code)]
pub async fn create_test_app_with(mut config: Config) -> (Router, Arc<AppState>) {
    config.bootstrap_admin = Some(BootstrapAdmin {
        username: ADMIN_USERNAME.to_string(),
        email: "admin@example.com".to_string(),
        password: ADMIN_PASSWORD.to_string(),
    });
    let state = AppState::new(config, Stores::in_memory()).expect("Failed to build state");
    if let Some(admin) = &state.config.bootstrap_admin {
        state
            .identity_service
            .ensure_admin(admin)
            .await
            .expect("Failed to seed admin");
    }
    let state = Arc::new(state);
    (create_router(state.clone()), state)
}

/// Create an identity directly through the service as the seeded admin.
#[allow(dead_code)]
pub async fn seed_identity(
    state: &AppState,
    username: &str,
    role: Role,
    coach: Option<IdentityId>,
) -> Identity {
    let admin = Actor {
        id: admin_id(state).await,
        role: Role::Admin,
    };
    state
        .identity_service
        .create_identity(
            Some(&admin),
            NewIdentity {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                secret: PASSWORD.to_string(),
                role: Some(role),
                coach,
                name: username.to_string(),
                discipline: Default::default(),
                date_of_birth: None,
                phone_number: None,
            },
        )
        .await
        .expect("Failed to seed identity")
}

#[allow(dead_code)]
pub async fn admin_id(state: &AppState) -> IdentityId {
    state
        .stores
        .identities
        .find_by_username(ADMIN_USERNAME)
        .await
        .unwrap()
        .expect("admin seeded")
        .id
}

/// Send a request, optionally with a bearer token and JSON body, and decode
/// the JSON response (`Value::Null` for empty bodies).
#[allow(dead_code)]
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    // Extractor rejections answer in plain text.
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

/// Log in and return the credential JSON.
#[allow(dead_code)]
pub async fn login(app: &Router, username: &str, password: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/auth/token",
        None,
        Some(serde_json::json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed for {username}: {body}");
    body
}

/// Log in and return only the access token.
#[allow(dead_code)]
pub async fn access_token(app: &Router, username: &str, password: &str) -> String {
    login(app, username, password).await["access"]
        .as_str()
        .unwrap()
        .to_string()
}

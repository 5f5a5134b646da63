// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Training-Lab API Server
//!
//! Serves identity management, session credentials and training records
//! for athletes, coaches and admins.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use training_lab::{config::Config, db::Stores, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        port = config.port,
        refresh_policy = ?config.refresh_policy,
        coach_deletion = ?config.coach_deletion,
        self_registration = config.allow_self_registration,
        "Starting Training-Lab API"
    );

    // In-process stores
    let stores = Stores::in_memory();

    let state = AppState::new(config.clone(), stores).expect("Failed to initialize services");

    // Seed the first admin so the directory can be managed at all
    match &config.bootstrap_admin {
        Some(admin) => {
            let identity = state
                .identity_service
                .ensure_admin(admin)
                .await
                .expect("Failed to create bootstrap admin");
            tracing::info!(identity = identity.id, "Bootstrap admin ready");
        }
        None => tracing::warn!("No BOOTSTRAP_ADMIN_USERNAME set; no admin can sign in"),
    }

    // Build router
    let app = training_lab::routes::create_router(Arc::new(state));

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("training_lab=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}

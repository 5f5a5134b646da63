// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Training-Lab: identity and authorization core for a sports-training platform
//!
//! This crate provides the backend API for athletes, coaches and admins:
//! coach assignment, role-based access to training records, and session
//! credentials with refresh and revocation.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Stores;
use services::{
    CredentialManager, IdentityPolicy, IdentityService, LabService, SecretVerifier,
    SessionService,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub stores: Stores,
    pub secrets: Arc<SecretVerifier>,
    pub credentials: Arc<CredentialManager>,
    pub identity_service: IdentityService,
    pub session_service: SessionService,
    pub lab_service: LabService,
}

impl AppState {
    /// Wire every service over the given stores.
    pub fn new(config: Config, stores: Stores) -> anyhow::Result<Self> {
        let secrets = Arc::new(SecretVerifier::new(config.password_hash_cost)?);
        let credentials = Arc::new(CredentialManager::new(
            &config.jwt_signing_key,
            config.credential_settings(),
            stores.identities.clone(),
            stores.revocations.clone(),
        )?);

        let identity_service = IdentityService::new(
            stores.identities.clone(),
            stores.records.clone(),
            secrets.clone(),
            credentials.clone(),
            IdentityPolicy {
                allow_self_registration: config.allow_self_registration,
                coach_deletion: config.coach_deletion,
            },
        );
        let session_service = SessionService::new(
            stores.identities.clone(),
            secrets.clone(),
            credentials.clone(),
        );
        let lab_service = LabService::new(stores.identities.clone(), stores.records.clone());

        Ok(Self {
            config,
            stores,
            secrets,
            credentials,
            identity_service,
            session_service,
            lab_service,
        })
    }
}

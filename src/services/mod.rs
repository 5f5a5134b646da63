// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod authorization;
pub mod credentials;
pub mod identity;
pub mod lab;
pub mod secrets;
pub mod session;

pub use authorization::{authorize, Action, Actor, Decision, DenyReason, Target};
pub use credentials::{CredentialError, CredentialManager, CredentialSettings, RefreshPolicy};
pub use identity::{IdentityPolicy, IdentityService};
pub use lab::LabService;
pub use secrets::{HashCost, SecretError, SecretVerifier};
pub use session::SessionService;

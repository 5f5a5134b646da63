// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod credential;
pub mod identity;
pub mod lab;

pub use credential::{Credential, RefreshTokenRecord};
pub use identity::{
    CoachChange, Discipline, Identity, IdentityChange, IdentityId, InvariantViolation, NewIdentity,
    Relationship, Role, Subject,
};
pub use lab::{EvaluationSession, FitnessTest, RecordId, TestResult};

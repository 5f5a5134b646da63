// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Domain records: test catalog, evaluation sessions and test results.

use super::identity::{Discipline, IdentityId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type RecordId = u64;

/// Unit a test result is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Seconds,
    Minutes,
    Meters,
    Centimeters,
    Kilograms,
    Repetitions,
    Score,
}

/// Physical quality a test measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Strength,
    Endurance,
    Speed,
    Flexibility,
    Agility,
    Balance,
    Coordination,
}

fn default_true() -> bool {
    true
}

/// Catalog entry describing a physical test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnessTest {
    pub id: RecordId,
    pub name: String,
    pub category: Category,
    pub description: String,
    pub unit: Unit,
    /// Whether a higher value is a better result.
    pub higher_is_better: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFitnessTest {
    pub name: String,
    pub category: Category,
    #[serde(default)]
    pub description: String,
    pub unit: Unit,
    #[serde(default = "default_true")]
    pub higher_is_better: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FitnessTestChange {
    pub name: Option<String>,
    pub category: Option<Category>,
    pub description: Option<String>,
    pub unit: Option<Unit>,
    pub higher_is_better: Option<bool>,
}

impl FitnessTestChange {
    pub fn apply_to(self, test: &mut FitnessTest) {
        if let Some(name) = self.name {
            test.name = name;
        }
        if let Some(category) = self.category {
            test.category = category;
        }
        if let Some(description) = self.description {
            test.description = description;
        }
        if let Some(unit) = self.unit {
            test.unit = unit;
        }
        if let Some(higher_is_better) = self.higher_is_better {
            test.higher_is_better = higher_is_better;
        }
    }
}

/// An evaluation session run by an admin evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSession {
    pub id: RecordId,
    pub date: NaiveDate,
    pub location: String,
    pub discipline: Discipline,
    pub evaluator: IdentityId,
    pub notes: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvaluationSession {
    pub date: NaiveDate,
    pub location: String,
    #[serde(default)]
    pub discipline: Discipline,
    #[serde(default)]
    pub notes: String,
}

/// One athlete's result for one test within one session.
///
/// (athlete, test, session) is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub id: RecordId,
    pub athlete: IdentityId,
    pub test: RecordId,
    pub session: RecordId,
    pub numeric_value: f64,
    pub notes: String,
    pub recorded_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTestResult {
    pub athlete: IdentityId,
    pub test: RecordId,
    pub session: RecordId,
    pub numeric_value: f64,
    #[serde(default)]
    pub notes: String,
}

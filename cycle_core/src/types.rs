//! Core domain types for the training cycle engine.
//!
//! This module defines the records shared by every component:
//! - Cycles and their archived history
//! - Per-cycle exercise usage (the rotation history)
//! - The generated workout plan for the active cycle
//! - Logged sets and body measurements
//! - The exercise catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

// ============================================================================
// Cycle Types
// ============================================================================

/// One training block for one user.
///
/// A cycle with `completed_date == None` is the user's active cycle; there is
/// at most one of those per user.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Cycle {
    pub cycle_number: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_date: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub completed_date: Option<DateTime<Utc>>,
    pub days_completed: u32,
    #[serde(default)]
    pub completed_microcycles: u32,
}

impl Cycle {
    /// A freshly started cycle with no progress
    pub fn new(cycle_number: u32, start_date: DateTime<Utc>) -> Self {
        Self {
            cycle_number,
            start_date,
            completed_date: None,
            days_completed: 0,
            completed_microcycles: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.completed_date.is_none()
    }
}

/// Archived record of a completed cycle. Append-only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CycleHistoryEntry {
    pub cycle_number: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub completed_date: DateTime<Utc>,
    pub days_completed: u32,
}

/// Which exercises were assigned to which slot during one cycle.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CycleExerciseHistory {
    pub cycle_number: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_date: DateTime<Utc>,
    /// slot name -> exercise names used in that slot
    #[serde(default)]
    pub used_exercises: BTreeMap<String, BTreeSet<String>>,
    pub pool_id: String,
}

impl CycleExerciseHistory {
    pub fn new(cycle_number: u32, start_date: DateTime<Utc>, pool_id: impl Into<String>) -> Self {
        Self {
            cycle_number,
            start_date,
            used_exercises: BTreeMap::new(),
            pool_id: pool_id.into(),
        }
    }

    /// Merge names into a slot's used-set. The set only ever grows.
    pub fn record<I, S>(&mut self, slot: &str, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let used = self.used_exercises.entry(slot.to_string()).or_default();
        used.extend(names.into_iter().map(Into::into));
    }

    pub fn used_in_slot(&self, slot: &str) -> Option<&BTreeSet<String>> {
        self.used_exercises.get(slot)
    }
}

// ============================================================================
// Workout Plan Types
// ============================================================================

/// One scheduled training day of the active cycle
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlanDay {
    pub day_index: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
    pub slot: String,
    pub exercises: Vec<String>,
}

/// The generated plan for one cycle
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutPlan {
    pub cycle_number: u32,
    pub pool_id: String,
    pub days: Vec<PlanDay>,
}

impl WorkoutPlan {
    pub fn day(&self, day_index: u32) -> Option<&PlanDay> {
        self.days.iter().find(|d| d.day_index == day_index)
    }

    /// First day (lowest index) whose exercise list contains `exercise`
    pub fn find_day_with_exercise(&self, exercise: &str) -> Option<&PlanDay> {
        self.days
            .iter()
            .filter(|d| d.exercises.iter().any(|e| e == exercise))
            .min_by_key(|d| d.day_index)
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

// ============================================================================
// Logged Data
// ============================================================================

/// One logged set. Never mutated after it is appended to the log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseStats {
    pub id: Uuid,
    pub exercise_name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
    pub weight: f64,
    pub reps: u32,
    pub set_number: u32,
    pub sets: u32,
    #[serde(default)]
    pub avg_heart_rate: Option<u32>,
    #[serde(default)]
    pub calories_burned: Option<f64>,
}

impl ExerciseStats {
    /// Weight moved in this set. Always derived, never stored.
    pub fn volume(&self) -> f64 {
        self.weight * f64::from(self.reps)
    }
}

/// A body parameter reading (weight, waist, body fat, ...)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BodyMeasurement {
    pub parameter: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
    pub value: f64,
}

/// Per-user record of one-time data migrations that have been applied
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct MigrationState {
    #[serde(default)]
    pub completion_keys_version: u32,
}

// ============================================================================
// Catalog Types
// ============================================================================

/// A candidate exercise and the muscle groups it trains
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseDescriptor {
    pub name: String,
    pub muscle_groups: Vec<String>,
}

/// A named muscle-group grouping and its ordered candidate exercises
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub name: String,
    pub exercises: Vec<String>,
}

/// The exercise catalog: slots in plan order plus the exercise lookup
#[derive(Clone, Debug)]
pub struct Catalog {
    pub pool_id: String,
    pub slots: Vec<Slot>,
    pub exercises: HashMap<String, ExerciseDescriptor>,
}

//! Completion markers and cycle progress counting.
//!
//! A marker records that one exercise on one plan day was done. Markers are
//! persisted as `{day_index}_{exercise}` strings; presence means done.
//!
//! Older data stored markers without a day index (`{exercise}` or
//! `{username}_{exercise}`). Those are only understood by
//! [`migrate_legacy_keys`], which rewrites them once into the current format.

use crate::{Error, Result, WorkoutPlan};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

/// Marker format version written by this crate
pub const COMPLETION_KEYS_VERSION: u32 = 1;

/// Structured completion marker
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompletionKey {
    pub day_index: u32,
    pub exercise: String,
}

impl CompletionKey {
    pub fn new(day_index: u32, exercise: impl Into<String>) -> Self {
        Self {
            day_index,
            exercise: exercise.into(),
        }
    }
}

impl fmt::Display for CompletionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.day_index, self.exercise)
    }
}

impl FromStr for CompletionKey {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let (day, exercise) = raw
            .split_once('_')
            .ok_or_else(|| Error::Other(format!("completion key '{}' has no day index", raw)))?;
        let day_index = day
            .parse::<u32>()
            .map_err(|_| Error::Other(format!("completion key '{}' has no day index", raw)))?;
        if exercise.is_empty() {
            return Err(Error::Other(format!(
                "completion key '{}' has no exercise name",
                raw
            )));
        }
        Ok(Self::new(day_index, exercise))
    }
}

/// Parse persisted markers, skipping anything not in the current format
pub fn completed_set(raw: &BTreeSet<String>) -> BTreeSet<CompletionKey> {
    raw.iter()
        .filter_map(|key| match key.parse::<CompletionKey>() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::debug!("Skipping marker: {}", e);
                None
            }
        })
        .collect()
}

/// Number of plan days with at least one completed exercise.
///
/// Touching a day counts it; not every exercise of the day has to be done.
pub fn completed_day_count(plan: &WorkoutPlan, completed: &BTreeSet<CompletionKey>) -> u32 {
    let touched = touched_days(completed);
    plan.days
        .iter()
        .filter(|d| touched.contains(&d.day_index))
        .count() as u32
}

/// Number of fully completed microcycles.
///
/// Plan days are split, in day-index order, into consecutive chunks of
/// `microcycle_days` (the last chunk may be shorter). A chunk counts once
/// every day in it is touched.
pub fn completed_microcycles(
    plan: &WorkoutPlan,
    completed: &BTreeSet<CompletionKey>,
    microcycle_days: u32,
) -> u32 {
    if microcycle_days == 0 {
        return 0;
    }

    let touched = touched_days(completed);
    let mut indices: Vec<u32> = plan.days.iter().map(|d| d.day_index).collect();
    indices.sort_unstable();

    indices
        .chunks(microcycle_days as usize)
        .filter(|chunk| chunk.iter().all(|i| touched.contains(i)))
        .count() as u32
}

fn touched_days(completed: &BTreeSet<CompletionKey>) -> HashSet<u32> {
    completed.iter().map(|k| k.day_index).collect()
}

/// Outcome of a legacy-key migration pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LegacyMigration {
    /// The full marker set after migration
    pub markers: BTreeSet<String>,
    /// Legacy keys rewritten into the current format
    pub rewritten: usize,
    /// Legacy keys whose exercise is not in the plan; kept unchanged
    pub unresolved: Vec<String>,
}

impl LegacyMigration {
    pub fn changed(&self) -> bool {
        self.rewritten > 0
    }

    fn rewrite(&mut self, legacy: &str, key: CompletionKey) {
        let rewritten = key.to_string();
        if rewritten != legacy {
            tracing::debug!("Migrated legacy marker '{}' -> '{}'", legacy, rewritten);
            self.rewritten += 1;
        }
        self.markers.insert(rewritten);
    }
}

/// Exercise name of a `{username}_{exercise}` marker
fn strip_username<'a>(raw: &'a str, username: &str) -> Option<&'a str> {
    raw.strip_prefix(username)
        .and_then(|rest| rest.strip_prefix('_'))
        .filter(|rest| !rest.is_empty())
}

/// Exercise name carried by a legacy marker
fn legacy_exercise<'a>(raw: &'a str, username: &str) -> &'a str {
    strip_username(raw, username).unwrap_or(raw)
}

/// Rewrite legacy markers to `{day_index}_{exercise}`.
///
/// The day is the lowest-index plan day listing the exercise. A
/// `{username}_` prefix is matched against the plan first, so a numeric
/// username is not mistaken for a day index. Other markers already in the
/// current format pass through untouched, so running this on its own output
/// yields the same set.
pub fn migrate_legacy_keys(
    raw: &BTreeSet<String>,
    plan: &WorkoutPlan,
    username: &str,
) -> LegacyMigration {
    let mut migration = LegacyMigration::default();

    for key in raw {
        let user_scoped = strip_username(key, username)
            .and_then(|exercise| plan.find_day_with_exercise(exercise).map(|day| (day, exercise)));
        if let Some((day, exercise)) = user_scoped {
            migration.rewrite(key, CompletionKey::new(day.day_index, exercise));
            continue;
        }

        if key.parse::<CompletionKey>().is_ok() {
            migration.markers.insert(key.clone());
            continue;
        }

        let exercise = legacy_exercise(key, username);
        match plan.find_day_with_exercise(exercise) {
            Some(day) => migration.rewrite(key, CompletionKey::new(day.day_index, exercise)),
            None => {
                tracing::warn!(
                    "Legacy marker '{}' does not match any planned exercise; leaving it as is",
                    key
                );
                migration.markers.insert(key.clone());
                migration.unresolved.push(key.clone());
            }
        }
    }

    migration
}

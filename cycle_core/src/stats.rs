//! Read-side projections over the logged sets and body measurements.
//!
//! Nothing here is stored: every summary is recomputed from the raw log and
//! the catalog's exercise → muscle-group tags.

use crate::config::InsightsConfig;
use crate::{BodyMeasurement, Catalog, ExerciseStats};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Sum of weight × reps over every logged set
pub fn total_volume(stats: &[ExerciseStats]) -> f64 {
    // folding from +0.0: an empty f64 sum is -0.0
    stats.iter().fold(0.0, |total, s| total + s.volume())
}

/// Aggregate load for one muscle group
#[derive(Clone, Debug, PartialEq)]
pub struct MuscleGroupSummary {
    pub muscle_group: String,
    pub total_volume: f64,
    /// Logged sets touching this group
    pub total_sets: u32,
    /// Distinct exercises logged for this group
    pub exercise_count: usize,
    pub max_weight: f64,
    pub last_workout: Option<DateTime<Utc>>,
    /// Whole days since `last_workout`; `None` means never trained
    pub days_since_last_workout: Option<i64>,
}

impl MuscleGroupSummary {
    fn empty(muscle_group: &str) -> Self {
        Self {
            muscle_group: muscle_group.to_string(),
            total_volume: 0.0,
            total_sets: 0,
            exercise_count: 0,
            max_weight: 0.0,
            last_workout: None,
            days_since_last_workout: None,
        }
    }
}

fn days_between(earlier: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - earlier).num_milliseconds().div_euclid(MILLIS_PER_DAY).max(0)
}

/// One summary per catalog muscle group, sorted by group name.
///
/// A set counts toward every group its exercise is tagged with. Sets for
/// exercises the catalog does not know are skipped.
pub fn per_muscle_group_summary(
    stats: &[ExerciseStats],
    catalog: &Catalog,
    now: DateTime<Utc>,
) -> Vec<MuscleGroupSummary> {
    let mut summaries: BTreeMap<String, MuscleGroupSummary> = catalog
        .all_muscle_groups()
        .into_iter()
        .map(|g| (g.clone(), MuscleGroupSummary::empty(&g)))
        .collect();
    let mut exercises: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();

    for set in stats {
        let groups = catalog.muscle_groups_of(&set.exercise_name);
        if groups.is_empty() {
            tracing::debug!("No muscle groups for '{}', skipping", set.exercise_name);
            continue;
        }

        for group in groups {
            let summary = summaries
                .entry(group.clone())
                .or_insert_with(|| MuscleGroupSummary::empty(group));
            summary.total_volume += set.volume();
            summary.total_sets += 1;
            summary.max_weight = summary.max_weight.max(set.weight);
            summary.last_workout = summary.last_workout.max(Some(set.date));
            exercises
                .entry(group.clone())
                .or_default()
                .insert(set.exercise_name.as_str());
        }
    }

    summaries
        .into_values()
        .map(|mut summary| {
            summary.exercise_count = exercises
                .get(&summary.muscle_group)
                .map(BTreeSet::len)
                .unwrap_or(0);
            summary.days_since_last_workout = summary.last_workout.map(|d| days_between(d, now));
            summary
        })
        .collect()
}

/// Advisory observations over muscle-group summaries
#[derive(Clone, Debug, PartialEq)]
pub enum Insight {
    MostTrained { muscle_group: String, volume: f64 },
    LeastTrained { muscle_group: String, volume: f64 },
    NeedsAttention { muscle_group: String, days_since: Option<i64> },
    Balanced,
}

impl fmt::Display for Insight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insight::MostTrained {
                muscle_group,
                volume,
            } => write!(f, "Most trained: {} ({:.0} total volume)", muscle_group, volume),
            Insight::LeastTrained {
                muscle_group,
                volume,
            } => write!(f, "Least trained: {} ({:.0} total volume)", muscle_group, volume),
            Insight::NeedsAttention {
                muscle_group,
                days_since: Some(days),
            } => write!(f, "Needs attention: {} not trained for {} days", muscle_group, days),
            Insight::NeedsAttention {
                muscle_group,
                days_since: None,
            } => write!(f, "Needs attention: {} has never been trained", muscle_group),
            Insight::Balanced => write!(f, "Balanced: training volume is even across muscle groups"),
        }
    }
}

/// Derive insights from summaries
///
/// - highest volume group → most trained
/// - lowest non-zero volume group (with ≥2 trained) → least trained
/// - untrained for more than `stale_after_days`, or never → needs attention
/// - every trained group within `balance_tolerance` of the mean → balanced
pub fn insights(summaries: &[MuscleGroupSummary], config: &InsightsConfig) -> Vec<Insight> {
    let mut found = Vec::new();

    let trained: Vec<&MuscleGroupSummary> =
        summaries.iter().filter(|s| s.total_volume > 0.0).collect();

    let most = trained
        .iter()
        .copied()
        .reduce(|best, s| if s.total_volume > best.total_volume { s } else { best });
    if let Some(most) = most {
        found.push(Insight::MostTrained {
            muscle_group: most.muscle_group.clone(),
            volume: most.total_volume,
        });
    }

    if trained.len() >= 2 {
        let least = trained
            .iter()
            .copied()
            .reduce(|low, s| if s.total_volume < low.total_volume { s } else { low });
        if let Some(least) = least {
            found.push(Insight::LeastTrained {
                muscle_group: least.muscle_group.clone(),
                volume: least.total_volume,
            });
        }
    }

    for summary in summaries {
        let stale = match summary.days_since_last_workout {
            Some(days) => days > config.stale_after_days,
            None => true,
        };
        if stale {
            found.push(Insight::NeedsAttention {
                muscle_group: summary.muscle_group.clone(),
                days_since: summary.days_since_last_workout,
            });
        }
    }

    if trained.len() >= 2 {
        let mean = trained.iter().map(|s| s.total_volume).sum::<f64>() / trained.len() as f64;
        let limit = mean * config.balance_tolerance;
        if trained
            .iter()
            .all(|s| (s.total_volume - mean).abs() <= limit)
        {
            found.push(Insight::Balanced);
        }
    }

    found
}

/// Per-exercise totals and personal best
#[derive(Clone, Debug, PartialEq)]
pub struct ExerciseSummary {
    pub exercise_name: String,
    pub total_volume: f64,
    pub total_sets: u32,
    pub best_weight: f64,
    pub last_date: DateTime<Utc>,
}

/// One summary per logged exercise name, sorted by name
pub fn exercise_summaries(stats: &[ExerciseStats]) -> Vec<ExerciseSummary> {
    let mut by_name: BTreeMap<&str, ExerciseSummary> = BTreeMap::new();

    for set in stats {
        let summary = by_name
            .entry(set.exercise_name.as_str())
            .or_insert_with(|| ExerciseSummary {
                exercise_name: set.exercise_name.clone(),
                total_volume: 0.0,
                total_sets: 0,
                best_weight: set.weight,
                last_date: set.date,
            });
        summary.total_volume += set.volume();
        summary.total_sets += 1;
        summary.best_weight = summary.best_weight.max(set.weight);
        summary.last_date = summary.last_date.max(set.date);
    }

    by_name.into_values().collect()
}

/// Volume per UTC calendar day, oldest first
pub fn daily_volume(stats: &[ExerciseStats]) -> Vec<(NaiveDate, f64)> {
    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for set in stats {
        *days.entry(set.date.date_naive()).or_insert(0.0) += set.volume();
    }
    days.into_iter().collect()
}

/// Change in a body parameter between its first and last reading
#[derive(Clone, Debug, PartialEq)]
pub struct Trend {
    pub parameter: String,
    pub readings: usize,
    pub first: f64,
    pub last: f64,
    pub first_date: DateTime<Utc>,
    pub last_date: DateTime<Utc>,
    pub change: f64,
    /// `None` when the first reading is zero
    pub change_percent: Option<f64>,
}

/// Trend for `parameter` (case-insensitive), or `None` without readings
pub fn parameter_trend(log: &[BodyMeasurement], parameter: &str) -> Option<Trend> {
    let mut readings: Vec<&BodyMeasurement> = log
        .iter()
        .filter(|m| m.parameter.eq_ignore_ascii_case(parameter))
        .collect();
    readings.sort_by_key(|m| m.date);

    let first = *readings.first()?;
    let last = *readings.last()?;
    let change = last.value - first.value;

    Some(Trend {
        parameter: first.parameter.clone(),
        readings: readings.len(),
        first: first.value,
        last: last.value,
        first_date: first.date,
        last_date: last.date,
        change,
        change_percent: (first.value != 0.0).then(|| change / first.value * 100.0),
    })
}

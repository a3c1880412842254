//! Training cycle engine.
//!
//! Ties the components together for one store:
//! - **Start**: number the cycle, rotate exercises per slot, lay the plan
//!   over the schedule
//! - **Mark**: record a completion marker, recount touched days and
//!   microcycles, auto-complete the cycle once every plan day is touched
//! - **Reset**: abandon the active cycle without archiving it
//! - **Statistics**: lock-free projections over the logged sets
//!
//! Cycle and completion mutations for one username are serialised: an
//! in-process mutex per user plus the store's cross-process user lock.

use crate::completion::{
    self, completed_day_count, completed_microcycles, completed_set, CompletionKey,
    COMPLETION_KEYS_VERSION,
};
use crate::cycle::CycleState;
use crate::history::next_cycle_number;
use crate::rotation::{rotate_for_cycle, SlotSelection};
use crate::schedule::generate_local_schedule;
use crate::stats::{self, ExerciseSummary, Insight, MuscleGroupSummary, Trend};
use crate::store::{validate_username, UserStore};
use crate::{
    BodyMeasurement, Catalog, Config, Cycle, CycleExerciseHistory, CycleHistoryEntry, Error,
    ExerciseStats, PlanDay, Result, WorkoutPlan,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A newly started cycle
#[derive(Clone, Debug)]
pub struct StartedCycle {
    pub cycle: Cycle,
    pub plan: WorkoutPlan,
    pub selections: Vec<SlotSelection>,
}

/// Cycle progress after a completion marker changed
#[derive(Clone, Debug, PartialEq)]
pub struct CycleProgress {
    pub cycle_number: u32,
    pub days_completed: u32,
    pub completed_microcycles: u32,
    /// Set when this mark finished the cycle
    pub completed: Option<CycleHistoryEntry>,
}

/// The cycle engine over a user store
pub struct Engine<S: UserStore> {
    store: S,
    catalog: Catalog,
    config: Config,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: UserStore> Engine<S> {
    /// Create an engine, rejecting an invalid config or catalog
    pub fn new(store: S, catalog: Catalog, config: Config) -> Result<Self> {
        config.validate()?;
        let errors = catalog.validate();
        if !errors.is_empty() {
            return Err(Error::CatalogValidation(errors.join("; ")));
        }

        Ok(Self {
            store,
            catalog,
            config,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `f` while holding `username`'s in-process and store locks
    fn with_user_lock<T>(&self, username: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        validate_username(username)?;

        let user_lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(username.to_string()).or_default().clone()
        };

        // the guarded data lives in the store, so a poisoned lock is still usable
        let _local = user_lock.lock().unwrap_or_else(|e| e.into_inner());
        let _stored = self.store.lock_user(username)?;
        f()
    }

    // ========================================================================
    // Cycle lifecycle
    // ========================================================================

    /// Start the user's next cycle on `start_date`.
    ///
    /// Fails with `Error::Precondition` if a cycle is already active.
    pub fn start_new_cycle(&self, username: &str, start_date: DateTime<Utc>) -> Result<StartedCycle> {
        self.with_user_lock(username, || {
            let record = self.store.load_cycle(username)?;
            let mut state = CycleState::from_record(record.clone());
            if let Some(active) = state.active() {
                return Err(Error::Precondition(format!(
                    "cycle {} is already active for '{}'; reset it or finish it first",
                    active.cycle_number, username
                )));
            }

            let archive = self.store.load_cycle_history(username)?;
            let exercise_history = self.store.load_cycle_exercise_history(username)?;
            let cycle_number = next_cycle_number(record.as_ref(), &archive, &exercise_history);

            let cycle = state.start(cycle_number, start_date)?.clone();

            let (selections, used) = rotate_for_cycle(
                &self.catalog,
                &exercise_history,
                self.config.rotation.window,
                self.config.cycle.exercises_per_slot,
                cycle_number,
                start_date,
            );
            let plan = self.build_plan(&cycle, &selections);

            // markers from an earlier cycle must not count toward this one
            self.store.clear_completion_markers(username)?;
            self.store.save_plan(username, &plan)?;
            self.store.append_cycle_exercise_history(username, &used)?;
            self.store.save_migration_state(
                username,
                &crate::MigrationState {
                    completion_keys_version: COMPLETION_KEYS_VERSION,
                },
            )?;
            self.store.save_cycle(username, &cycle)?;

            tracing::info!(
                "Started cycle {} for '{}' with {} plan days",
                cycle.cycle_number,
                username,
                plan.len()
            );

            Ok(StartedCycle {
                cycle,
                plan,
                selections,
            })
        })
    }

    /// Lay the slot selections over the schedule, slots in catalog order
    fn build_plan(&self, cycle: &Cycle, selections: &[SlotSelection]) -> WorkoutPlan {
        let dates = generate_local_schedule(
            cycle.start_date,
            self.config.cycle.frequency,
            self.config.cycle.length_days as usize,
        );
        build_plan(cycle.cycle_number, &self.catalog.pool_id, &dates, selections)
    }

    /// The user's active cycle, if any
    pub fn active_cycle(&self, username: &str) -> Result<Option<Cycle>> {
        validate_username(username)?;
        let state = CycleState::from_record(self.store.load_cycle(username)?);
        Ok(state.active().cloned())
    }

    /// The plan of the active cycle, if any
    pub fn plan(&self, username: &str) -> Result<Option<WorkoutPlan>> {
        if self.active_cycle(username)?.is_none() {
            return Ok(None);
        }
        self.store.load_plan(username)
    }

    /// Abandon the active cycle. Nothing is archived.
    ///
    /// Returns the discarded cycle, or `None` if there was nothing to reset.
    pub fn reset_cycle(&self, username: &str) -> Result<Option<Cycle>> {
        self.with_user_lock(username, || {
            let mut state = CycleState::from_record(self.store.load_cycle(username)?);
            let abandoned = match state.reset() {
                Some(cycle) => cycle,
                None => {
                    tracing::info!("No active cycle to reset for '{}'", username);
                    return Ok(None);
                }
            };

            self.store.clear_completion_markers(username)?;
            self.store.clear_plan(username)?;
            self.store.clear_cycle(username)?;

            tracing::info!(
                "Reset cycle {} for '{}'",
                abandoned.cycle_number,
                username
            );
            Ok(Some(abandoned))
        })
    }

    /// Completed cycles, oldest first
    pub fn cycle_history(&self, username: &str) -> Result<Vec<CycleHistoryEntry>> {
        validate_username(username)?;
        let mut history = self.store.load_cycle_history(username)?;
        history.sort_by_key(|e| e.cycle_number);
        Ok(history)
    }

    /// Exercise usage per cycle, oldest first
    pub fn exercise_history(&self, username: &str) -> Result<Vec<CycleExerciseHistory>> {
        validate_username(username)?;
        let mut history = self.store.load_cycle_exercise_history(username)?;
        history.sort_by_key(|e| e.cycle_number);
        Ok(history)
    }

    // ========================================================================
    // Completion tracking
    // ========================================================================

    /// Mark (or un-mark) `exercise` on plan day `day_index` of the active cycle.
    ///
    /// Progress counters never decrease. When every plan day has been touched
    /// the cycle is completed and archived in the same call.
    pub fn mark_exercise(
        &self,
        username: &str,
        day_index: u32,
        exercise: &str,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<CycleProgress> {
        if exercise.trim().is_empty() {
            return Err(Error::Precondition("exercise name is empty".into()));
        }

        self.with_user_lock(username, || {
            let mut state = CycleState::from_record(self.store.load_cycle(username)?);
            let cycle_number = match state.active() {
                Some(cycle) => cycle.cycle_number,
                None => {
                    return Err(Error::Precondition(format!(
                        "'{}' has no active cycle; start one first",
                        username
                    )))
                }
            };
            let plan = self.active_plan(username, cycle_number)?;

            let day = plan.day(day_index).ok_or_else(|| {
                Error::Precondition(format!(
                    "day {} is outside the plan (0..{})",
                    day_index,
                    plan.len()
                ))
            })?;
            if !day.exercises.iter().any(|e| e == exercise) {
                tracing::debug!(
                    "'{}' is not planned on day {}; recording it anyway",
                    exercise,
                    day_index
                );
            }

            self.migrate_locked(username, &plan)?;

            let key = CompletionKey::new(day_index, exercise).to_string();
            if completed {
                self.store.set_completion_marker(username, &key)?;
            } else {
                self.store.clear_completion_marker(username, &key)?;
            }

            let done = completed_set(&self.store.load_completion_markers(username)?);
            let days = completed_day_count(&plan, &done);
            let micro = completed_microcycles(&plan, &done, self.config.cycle.microcycle_days);

            let changed = state.record_progress(days, micro)?;
            let required = plan.len() as u32;

            if state.is_due_for_completion(required) {
                let finished = state.complete(now, required)?;
                self.store.save_cycle(username, &finished.cycle)?;
                self.store.append_cycle_history(username, &finished.entry)?;
                self.store.clear_completion_markers(username)?;
                self.store.clear_plan(username)?;

                tracing::info!(
                    "'{}' completed cycle {} ({} days)",
                    username,
                    finished.entry.cycle_number,
                    finished.entry.days_completed
                );

                return Ok(CycleProgress {
                    cycle_number,
                    days_completed: finished.cycle.days_completed,
                    completed_microcycles: finished.cycle.completed_microcycles,
                    completed: Some(finished.entry),
                });
            }

            let cycle = state
                .active()
                .cloned()
                .ok_or_else(|| Error::Other("active cycle disappeared".into()))?;
            if changed {
                self.store.save_cycle(username, &cycle)?;
            }

            tracing::debug!(
                "'{}' cycle {}: {} days, {} microcycles",
                username,
                cycle_number,
                cycle.days_completed,
                cycle.completed_microcycles
            );

            Ok(CycleProgress {
                cycle_number,
                days_completed: cycle.days_completed,
                completed_microcycles: cycle.completed_microcycles,
                completed: None,
            })
        })
    }

    fn active_plan(&self, username: &str, cycle_number: u32) -> Result<WorkoutPlan> {
        match self.store.load_plan(username)? {
            Some(plan) if plan.cycle_number == cycle_number => Ok(plan),
            Some(plan) => Err(Error::Precondition(format!(
                "stored plan belongs to cycle {}, not {}; reset the cycle",
                plan.cycle_number, cycle_number
            ))),
            None => Err(Error::Precondition(format!(
                "cycle {} has no plan; reset the cycle",
                cycle_number
            ))),
        }
    }

    /// Current completion markers of the active cycle
    pub fn completed_set(&self, username: &str) -> Result<BTreeSet<CompletionKey>> {
        self.with_user_lock(username, || {
            if let Some(plan) = self.current_plan(username)? {
                self.migrate_locked(username, &plan)?;
            }
            Ok(completed_set(&self.store.load_completion_markers(username)?))
        })
    }

    /// Touched plan days of the active cycle (0 without one)
    pub fn completed_day_count(&self, username: &str) -> Result<u32> {
        self.with_user_lock(username, || {
            let plan = match self.current_plan(username)? {
                Some(plan) => plan,
                None => return Ok(0),
            };
            self.migrate_locked(username, &plan)?;
            let done = completed_set(&self.store.load_completion_markers(username)?);
            Ok(completed_day_count(&plan, &done))
        })
    }

    fn current_plan(&self, username: &str) -> Result<Option<WorkoutPlan>> {
        let state = CycleState::from_record(self.store.load_cycle(username)?);
        match state.active() {
            Some(cycle) => Ok(self
                .store
                .load_plan(username)?
                .filter(|p| p.cycle_number == cycle.cycle_number)),
            None => Ok(None),
        }
    }

    /// Rewrite legacy completion markers for the active plan.
    ///
    /// Runs at most once per user; later calls return 0. Without an active
    /// plan nothing can be resolved, so the migration is deferred.
    pub fn migrate_legacy_keys(&self, username: &str) -> Result<usize> {
        self.with_user_lock(username, || match self.current_plan(username)? {
            Some(plan) => self.migrate_locked(username, &plan),
            None => {
                tracing::info!("No active plan for '{}'; deferring marker migration", username);
                Ok(0)
            }
        })
    }

    fn migrate_locked(&self, username: &str, plan: &WorkoutPlan) -> Result<usize> {
        let mut meta = self.store.load_migration_state(username)?;
        if meta.completion_keys_version >= COMPLETION_KEYS_VERSION {
            return Ok(0);
        }

        let markers = self.store.load_completion_markers(username)?;
        let migration = completion::migrate_legacy_keys(&markers, plan, username);
        if migration.changed() {
            self.store
                .replace_completion_markers(username, &migration.markers)?;
        }

        meta.completion_keys_version = COMPLETION_KEYS_VERSION;
        self.store.save_migration_state(username, &meta)?;

        tracing::info!(
            "Migrated {} legacy markers for '{}' ({} unresolved)",
            migration.rewritten,
            username,
            migration.unresolved.len()
        );
        Ok(migration.rewritten)
    }

    // ========================================================================
    // Logging
    // ========================================================================

    /// Append a logged set to the user's log
    pub fn log_set(&self, username: &str, set: &ExerciseStats) -> Result<()> {
        validate_username(username)?;
        if set.exercise_name.trim().is_empty() {
            return Err(Error::Precondition("exercise name is empty".into()));
        }
        if !set.weight.is_finite() || set.weight < 0.0 {
            return Err(Error::Precondition(format!(
                "weight must be a non-negative number, got {}",
                set.weight
            )));
        }
        if self.catalog.muscle_groups_of(&set.exercise_name).is_empty() {
            tracing::warn!(
                "'{}' is not in the catalog; it won't count toward muscle groups",
                set.exercise_name
            );
        }

        self.store.append_exercise_stats(username, set)?;
        tracing::debug!("Logged set {} of '{}'", set.set_number, set.exercise_name);
        Ok(())
    }

    /// Delete the user's whole set log
    pub fn clear_stats(&self, username: &str) -> Result<()> {
        self.with_user_lock(username, || {
            self.store.clear_exercise_stats(username)?;
            tracing::info!("Cleared set log for '{}'", username);
            Ok(())
        })
    }

    /// Append a body measurement
    pub fn log_body_measurement(&self, username: &str, measurement: &BodyMeasurement) -> Result<()> {
        validate_username(username)?;
        if measurement.parameter.trim().is_empty() || !measurement.value.is_finite() {
            return Err(Error::Precondition(
                "measurement needs a parameter name and a finite value".into(),
            ));
        }
        self.store.append_body_measurement(username, measurement)
    }

    // ========================================================================
    // Statistics (read-only; failures degrade to empty results)
    // ========================================================================

    fn stats_snapshot(&self, username: &str) -> Vec<ExerciseStats> {
        match self.store.load_exercise_stats_log(username) {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!("Unable to read set log for '{}': {}", username, e);
                Vec::new()
            }
        }
    }

    pub fn total_volume(&self, username: &str) -> f64 {
        stats::total_volume(&self.stats_snapshot(username))
    }

    pub fn muscle_group_summaries(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Vec<MuscleGroupSummary> {
        stats::per_muscle_group_summary(&self.stats_snapshot(username), &self.catalog, now)
    }

    pub fn insights(&self, username: &str, now: DateTime<Utc>) -> Vec<Insight> {
        stats::insights(
            &self.muscle_group_summaries(username, now),
            &self.config.insights,
        )
    }

    pub fn exercise_summaries(&self, username: &str) -> Vec<ExerciseSummary> {
        stats::exercise_summaries(&self.stats_snapshot(username))
    }

    pub fn daily_volume(&self, username: &str) -> Vec<(NaiveDate, f64)> {
        stats::daily_volume(&self.stats_snapshot(username))
    }

    pub fn body_trend(&self, username: &str, parameter: &str) -> Option<Trend> {
        match self.store.load_body_measurements(username) {
            Ok(log) => stats::parameter_trend(&log, parameter),
            Err(e) => {
                tracing::warn!("Unable to read body log for '{}': {}", username, e);
                None
            }
        }
    }

    /// Write the user's set log to a CSV file
    pub fn export_stats_csv(&self, username: &str, path: &Path) -> Result<usize> {
        validate_username(username)?;
        let log = self.store.load_exercise_stats_log(username)?;
        crate::export::export_stats_csv(&log, path)
    }
}

/// Assign slots round-robin over the dates
fn build_plan(
    cycle_number: u32,
    pool_id: &str,
    dates: &[DateTime<Utc>],
    selections: &[SlotSelection],
) -> WorkoutPlan {
    let days = if selections.is_empty() {
        Vec::new()
    } else {
        dates
            .iter()
            .enumerate()
            .map(|(i, date)| {
                let selection = &selections[i % selections.len()];
                PlanDay {
                    day_index: i as u32,
                    date: *date,
                    slot: selection.slot.clone(),
                    exercises: selection.exercises.clone(),
                }
            })
            .collect()
    };

    WorkoutPlan {
        cycle_number,
        pool_id: pool_id.to_string(),
        days,
    }
}

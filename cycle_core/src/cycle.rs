//! Lifecycle of a user's training cycle.
//!
//! ```text
//! NoActiveCycle --start--> Active --complete--> (Completed, archived) --> NoActiveCycle
//!                            |  ^
//!                            |  +-- record_progress
//!                            +--reset--> NoActiveCycle   (no history entry)
//! ```
//!
//! Every transition that is not allowed from the current state returns
//! `Error::Precondition` and leaves the state untouched.

use crate::{Cycle, CycleHistoryEntry, Error, Result};
use chrono::{DateTime, Utc};

/// The state of one user's cycle
#[derive(Clone, Debug, PartialEq, Default)]
pub enum CycleState {
    #[default]
    NoActiveCycle,
    Active(Cycle),
}

/// Result of completing a cycle: the stamped record and its archive entry
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedCycle {
    pub cycle: Cycle,
    pub entry: CycleHistoryEntry,
}

impl CycleState {
    /// Rebuild the state from the persisted cycle record.
    ///
    /// A record that already carries a completed date is history, not an
    /// active cycle.
    pub fn from_record(record: Option<Cycle>) -> Self {
        match record {
            Some(cycle) if cycle.is_active() => CycleState::Active(cycle),
            _ => CycleState::NoActiveCycle,
        }
    }

    pub fn active(&self) -> Option<&Cycle> {
        match self {
            CycleState::Active(cycle) => Some(cycle),
            CycleState::NoActiveCycle => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, CycleState::Active(_))
    }

    /// Begin cycle `cycle_number`. Rejected while another cycle is active.
    pub fn start(&mut self, cycle_number: u32, start_date: DateTime<Utc>) -> Result<&Cycle> {
        if let CycleState::Active(current) = self {
            return Err(Error::Precondition(format!(
                "cycle {} is still active; complete or reset it first",
                current.cycle_number
            )));
        }
        if cycle_number == 0 {
            return Err(Error::Precondition("cycle numbers start at 1".into()));
        }

        tracing::info!("Starting cycle {} at {}", cycle_number, start_date);
        *self = CycleState::Active(Cycle::new(cycle_number, start_date));
        self.active()
            .ok_or_else(|| Error::Other("cycle state lost after start".into()))
    }

    /// Raise the progress counters. Lower values are ignored, so progress
    /// never goes backwards. Returns whether anything changed.
    pub fn record_progress(&mut self, days_completed: u32, completed_microcycles: u32) -> Result<bool> {
        let cycle = match self {
            CycleState::Active(cycle) => cycle,
            CycleState::NoActiveCycle => {
                return Err(Error::Precondition("no active cycle to record progress on".into()))
            }
        };

        let days = cycle.days_completed.max(days_completed);
        let micro = cycle.completed_microcycles.max(completed_microcycles);
        let changed = days != cycle.days_completed || micro != cycle.completed_microcycles;

        if days_completed < cycle.days_completed {
            tracing::debug!(
                "Ignoring progress decrease for cycle {} ({} -> {})",
                cycle.cycle_number,
                cycle.days_completed,
                days_completed
            );
        }

        cycle.days_completed = days;
        cycle.completed_microcycles = micro;
        Ok(changed)
    }

    /// Whether the active cycle has reached `required_days`
    pub fn is_due_for_completion(&self, required_days: u32) -> bool {
        self.active()
            .map(|c| c.days_completed >= required_days)
            .unwrap_or(false)
    }

    /// Finish the active cycle and move to `NoActiveCycle`.
    ///
    /// Only allowed once `days_completed >= required_days`.
    pub fn complete(
        &mut self,
        completed_date: DateTime<Utc>,
        required_days: u32,
    ) -> Result<CompletedCycle> {
        let cycle = match self {
            CycleState::Active(cycle) => cycle,
            CycleState::NoActiveCycle => {
                return Err(Error::Precondition("no active cycle to complete".into()))
            }
        };

        if cycle.days_completed < required_days {
            return Err(Error::Precondition(format!(
                "cycle {} has {} of {} days completed",
                cycle.cycle_number, cycle.days_completed, required_days
            )));
        }

        let mut finished = cycle.clone();
        finished.completed_date = Some(completed_date);

        let entry = CycleHistoryEntry {
            cycle_number: finished.cycle_number,
            start_date: finished.start_date,
            completed_date,
            days_completed: finished.days_completed,
        };

        tracing::info!(
            "Completed cycle {} with {} days",
            entry.cycle_number,
            entry.days_completed
        );

        *self = CycleState::NoActiveCycle;
        Ok(CompletedCycle {
            cycle: finished,
            entry,
        })
    }

    /// Abandon the active cycle. Returns the discarded cycle, if there was one.
    pub fn reset(&mut self) -> Option<Cycle> {
        match std::mem::take(self) {
            CycleState::Active(cycle) => {
                tracing::info!("Abandoned cycle {}", cycle.cycle_number);
                Some(cycle)
            }
            CycleState::NoActiveCycle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_state() -> CycleState {
        let mut state = CycleState::NoActiveCycle;
        state.start(1, Utc::now()).unwrap();
        state
    }

    #[test]
    fn test_start_from_idle() {
        let mut state = CycleState::default();
        let cycle = state.start(1, Utc::now()).unwrap();
        assert_eq!(cycle.cycle_number, 1);
        assert_eq!(cycle.days_completed, 0);
        assert!(cycle.completed_date.is_none());
        assert!(state.is_active());
    }

    #[test]
    fn test_start_while_active_is_rejected() {
        let mut state = active_state();
        let before = state.clone();

        let err = state.start(2, Utc::now()).unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(state, before);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut state = active_state();

        assert!(state.record_progress(3, 0).unwrap());
        assert!(!state.record_progress(2, 0).unwrap());
        assert_eq!(state.active().unwrap().days_completed, 3);

        for days in 3..=10 {
            state.record_progress(days, days / 7).unwrap();
            assert_eq!(state.active().unwrap().days_completed, days);
        }
        assert_eq!(state.active().unwrap().completed_microcycles, 1);
    }

    #[test]
    fn test_complete_requires_enough_days() {
        let mut state = active_state();
        state.record_progress(29, 4).unwrap();

        assert!(state.complete(Utc::now(), 30).unwrap_err().is_precondition());
        assert!(state.is_active());
        assert!(!state.is_due_for_completion(30));
    }

    #[test]
    fn test_complete_archives_and_returns_to_idle() {
        let mut state = active_state();
        state.record_progress(30, 4).unwrap();
        assert!(state.is_due_for_completion(30));

        let done = Utc::now();
        let completed = state.complete(done, 30).unwrap();

        assert_eq!(completed.cycle.completed_date, Some(done));
        assert_eq!(completed.entry.cycle_number, 1);
        assert_eq!(completed.entry.days_completed, 30);
        assert_eq!(completed.entry.completed_date, done);
        assert_eq!(state, CycleState::NoActiveCycle);
    }

    #[test]
    fn test_reset_discards_without_history() {
        let mut state = active_state();
        let abandoned = state.reset().unwrap();
        assert_eq!(abandoned.cycle_number, 1);
        assert!(!state.is_active());
        assert!(state.reset().is_none());
    }

    #[test]
    fn test_completed_record_is_not_active() {
        let mut cycle = Cycle::new(4, Utc::now());
        cycle.completed_date = Some(Utc::now());
        assert_eq!(CycleState::from_record(Some(cycle)), CycleState::NoActiveCycle);
        assert_eq!(CycleState::from_record(None), CycleState::NoActiveCycle);
    }

    #[test]
    fn test_record_progress_without_cycle_fails() {
        let mut state = CycleState::NoActiveCycle;
        assert!(state.record_progress(1, 0).unwrap_err().is_precondition());
    }
}

//! Cycle history queries.
//!
//! Exercise usage is consulted through a recency window: only the most recent
//! N cycles (by cycle number) count as "used". The archive of completed
//! cycles determines the next cycle number.

use crate::{Cycle, CycleExerciseHistory, CycleHistoryEntry};
use std::collections::HashMap;

/// The most recent `window` exercise-history entries, oldest first.
///
/// `None` keeps every entry. Entries are ordered by cycle number regardless of
/// the order they were stored in.
pub fn recent_window(
    history: &[CycleExerciseHistory],
    window: Option<usize>,
) -> Vec<&CycleExerciseHistory> {
    let mut entries: Vec<_> = history.iter().collect();
    entries.sort_by_key(|e| e.cycle_number);

    if let Some(limit) = window {
        let skip = entries.len().saturating_sub(limit);
        entries = entries.split_off(skip);
    }

    entries
}

/// For each exercise used in `slot`, the latest cycle number it appeared in
pub fn last_used_cycle(entries: &[&CycleExerciseHistory], slot: &str) -> HashMap<String, u32> {
    let mut last_used = HashMap::new();
    for entry in entries {
        if let Some(used) = entry.used_in_slot(slot) {
            for name in used {
                let seen = last_used.entry(name.clone()).or_insert(entry.cycle_number);
                *seen = (*seen).max(entry.cycle_number);
            }
        }
    }
    last_used
}

/// Next cycle number for a user: one past the highest number seen anywhere,
/// or 1 for a new user.
///
/// Abandoned cycles leave an exercise-history entry behind, so their numbers
/// are never reused.
pub fn next_cycle_number(
    current: Option<&Cycle>,
    archive: &[CycleHistoryEntry],
    exercise_history: &[CycleExerciseHistory],
) -> u32 {
    let highest = archive
        .iter()
        .map(|e| e.cycle_number)
        .chain(exercise_history.iter().map(|e| e.cycle_number))
        .chain(current.map(|c| c.cycle_number))
        .max()
        .unwrap_or(0);
    highest + 1
}

//! History-aware exercise rotation.
//!
//! Selection for a slot:
//! 1. **Fresh first**: catalog exercises not used in the slot within the
//!    recency window, in catalog order
//! 2. **Least recently used**: if fresh ones run out, used exercises ordered
//!    by the cycle they last appeared in (oldest first, catalog order on ties)
//! 3. **Never pad**: a catalog smaller than the request yields everything it
//!    has and reports the shortfall

use crate::history::{last_used_cycle, recent_window};
use crate::{Catalog, CycleExerciseHistory};
use chrono::{DateTime, Utc};

/// Exercises picked for one slot in a new cycle
#[derive(Clone, Debug, PartialEq)]
pub struct SlotSelection {
    pub slot: String,
    pub exercises: Vec<String>,
    /// How many requested exercises the catalog could not supply
    pub shortfall: usize,
}

/// Select `count` exercises for `slot` from its catalog, minimising repetition
/// against the user's exercise history.
pub fn select_exercises_for_slot(
    slot: &str,
    catalog_for_slot: &[String],
    history: &[CycleExerciseHistory],
    window: Option<usize>,
    count: usize,
) -> SlotSelection {
    let entries = recent_window(history, window);
    let last_used = last_used_cycle(&entries, slot);

    let (fresh, mut used): (Vec<&String>, Vec<&String>) = catalog_for_slot
        .iter()
        .partition(|name| !last_used.contains_key(name.as_str()));

    // sort_by_key is stable, so equal recency keeps catalog order
    used.sort_by_key(|name| last_used.get(name.as_str()).copied().unwrap_or(0));

    let exercises: Vec<String> = fresh
        .into_iter()
        .chain(used)
        .take(count)
        .cloned()
        .collect();

    let shortfall = count.saturating_sub(exercises.len());
    if shortfall > 0 {
        tracing::warn!(
            "Slot '{}' has only {} candidate exercises, {} requested",
            slot,
            catalog_for_slot.len(),
            count
        );
    }

    tracing::debug!("Selected {:?} for slot '{}'", exercises, slot);

    SlotSelection {
        slot: slot.to_string(),
        exercises,
        shortfall,
    }
}

/// Run selection for every catalog slot, in catalog order, and build the
/// exercise-history entry for the new cycle.
pub fn rotate_for_cycle(
    catalog: &Catalog,
    history: &[CycleExerciseHistory],
    window: Option<usize>,
    count: usize,
    cycle_number: u32,
    start_date: DateTime<Utc>,
) -> (Vec<SlotSelection>, CycleExerciseHistory) {
    let mut entry = CycleExerciseHistory::new(cycle_number, start_date, catalog.pool_id.clone());

    let selections: Vec<SlotSelection> = catalog
        .slots
        .iter()
        .map(|slot| {
            let selection =
                select_exercises_for_slot(&slot.name, &slot.exercises, history, window, count);
            entry.record(&slot.name, selection.exercises.iter().cloned());
            selection
        })
        .collect();

    tracing::info!(
        "Rotated exercises for cycle {} across {} slots",
        cycle_number,
        selections.len()
    );

    (selections, entry)
}

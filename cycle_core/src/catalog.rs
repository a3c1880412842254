//! Exercise catalog: slots, their candidate exercises, and muscle-group tags.
//!
//! The built-in catalog is plain data; a replacement can be loaded from a TOML
//! file with the same shape. The engine never hard-codes exercise content.

use crate::types::*;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

/// Pool identifier recorded in exercise history for the built-in catalog
pub const DEFAULT_POOL_ID: &str = "default-v1";

/// Cached default catalog - built once and reused across all operations
static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(build_default_catalog);

type SlotTable = (&'static str, &'static [(&'static str, &'static [&'static str])]);

const DEFAULT_SLOTS: &[SlotTable] = &[
    (
        "Chest & Back",
        &[
            ("Bench Press", &["Chest", "Triceps"]),
            ("Bent-Over Row", &["Back", "Biceps"]),
            ("Push-up", &["Chest", "Triceps"]),
            ("Pull-up", &["Back", "Biceps"]),
            ("Incline Dumbbell Press", &["Chest", "Shoulders"]),
            ("Seated Cable Row", &["Back"]),
        ],
    ),
    (
        "Legs & Glutes",
        &[
            ("Squat", &["Quads", "Glutes"]),
            ("Romanian Deadlift", &["Hamstrings", "Glutes"]),
            ("Walking Lunge", &["Quads", "Glutes"]),
            ("Hip Thrust", &["Glutes"]),
            ("Leg Press", &["Quads"]),
            ("Calf Raise", &["Calves"]),
        ],
    ),
    (
        "Shoulders & Arms",
        &[
            ("Overhead Press", &["Shoulders", "Triceps"]),
            ("Lateral Raise", &["Shoulders"]),
            ("Bicep Curl", &["Biceps"]),
            ("Triceps Dip", &["Triceps", "Chest"]),
            ("Face Pull", &["Shoulders", "Back"]),
            ("Hammer Curl", &["Biceps"]),
        ],
    ),
    (
        "Core",
        &[
            ("Plank", &["Core"]),
            ("Dead Bug", &["Core"]),
            ("Hanging Leg Raise", &["Core"]),
            ("Russian Twist", &["Core"]),
            ("Side Plank", &["Core"]),
            ("Ab Wheel Rollout", &["Core"]),
        ],
    ),
];

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static Catalog {
    &DEFAULT_CATALOG
}

/// Builds the default catalog from the built-in slot table
///
/// **Note**: prefer `get_default_catalog()` which returns a cached reference.
pub fn build_default_catalog() -> Catalog {
    let mut slots = Vec::with_capacity(DEFAULT_SLOTS.len());
    let mut exercises = HashMap::new();

    for (slot_name, entries) in DEFAULT_SLOTS {
        let mut names = Vec::with_capacity(entries.len());
        for (name, groups) in entries.iter() {
            names.push(name.to_string());
            exercises.insert(
                name.to_string(),
                ExerciseDescriptor {
                    name: name.to_string(),
                    muscle_groups: groups.iter().map(|g| g.to_string()).collect(),
                },
            );
        }
        slots.push(Slot {
            name: slot_name.to_string(),
            exercises: names,
        });
    }

    Catalog {
        pool_id: DEFAULT_POOL_ID.to_string(),
        slots,
        exercises,
    }
}

/// On-disk catalog format
#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    pool_id: String,
    #[serde(default)]
    slots: Vec<Slot>,
    #[serde(default)]
    exercises: Vec<ExerciseDescriptor>,
}

impl Catalog {
    /// Load a catalog from a TOML file and validate it
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let catalog = Self::from_toml_str(&contents)?;
        tracing::info!(
            "Loaded catalog '{}' from {:?} ({} slots, {} exercises)",
            catalog.pool_id,
            path,
            catalog.slots.len(),
            catalog.exercises.len()
        );
        Ok(catalog)
    }

    /// Parse and validate a catalog from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(contents)?;
        let catalog = Catalog {
            pool_id: file.pool_id,
            slots: file.slots,
            exercises: file
                .exercises
                .into_iter()
                .map(|e| (e.name.clone(), e))
                .collect(),
        };

        let errors = catalog.validate();
        if !errors.is_empty() {
            return Err(Error::CatalogValidation(errors.join("; ")));
        }
        Ok(catalog)
    }

    /// Look up a slot by name
    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.name == name)
    }

    /// Muscle groups of an exercise, empty if the exercise is unknown
    pub fn muscle_groups_of(&self, exercise: &str) -> &[String] {
        self.exercises
            .get(exercise)
            .map(|e| e.muscle_groups.as_slice())
            .unwrap_or(&[])
    }

    /// Every muscle group referenced by the catalog, sorted
    pub fn all_muscle_groups(&self) -> Vec<String> {
        let groups: BTreeSet<&String> = self
            .exercises
            .values()
            .flat_map(|e| e.muscle_groups.iter())
            .collect();
        groups.into_iter().cloned().collect()
    }

    /// Validate the catalog for consistency and completeness
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.pool_id.trim().is_empty() {
            errors.push("Catalog has empty pool_id".to_string());
        }
        if self.slots.is_empty() {
            errors.push("Catalog has no slots".to_string());
        }

        for (key, exercise) in &self.exercises {
            if key.is_empty() || exercise.name.is_empty() {
                errors.push("Exercise has empty name".to_string());
            }
            if key != &exercise.name {
                errors.push(format!(
                    "Exercise key '{}' doesn't match exercise.name '{}'",
                    key, exercise.name
                ));
            }
            if exercise.muscle_groups.is_empty() {
                errors.push(format!("Exercise '{}' has no muscle groups", key));
            }
        }

        let mut seen_slots = HashSet::new();
        for slot in &self.slots {
            if slot.name.trim().is_empty() {
                errors.push("Slot has empty name".to_string());
            }
            if !seen_slots.insert(slot.name.as_str()) {
                errors.push(format!("Duplicate slot '{}'", slot.name));
            }
            if slot.exercises.is_empty() {
                errors.push(format!("Slot '{}' has no exercises", slot.name));
            }

            let mut seen_in_slot = HashSet::new();
            for name in &slot.exercises {
                if !seen_in_slot.insert(name.as_str()) {
                    errors.push(format!(
                        "Slot '{}' lists exercise '{}' more than once",
                        slot.name, name
                    ));
                }
                if !self.exercises.contains_key(name) {
                    errors.push(format!(
                        "Slot '{}' references non-existent exercise '{}'",
                        slot.name, name
                    ));
                }
            }
        }

        errors
    }
}

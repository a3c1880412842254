#![forbid(unsafe_code)]

//! Core domain model and business logic for the training cycle engine.
//!
//! This crate provides:
//! - Domain types (cycles, plans, logged sets, body measurements)
//! - Catalog management and per-slot exercise rotation
//! - Workout schedule generation
//! - Cycle lifecycle and completion tracking
//! - Persistence (per-user JSON documents and JSONL logs)
//! - Statistics, insights and CSV export

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod schedule;
pub mod history;
pub mod rotation;
pub mod cycle;
pub mod completion;
pub mod stats;
pub mod store;
pub mod export;
pub mod engine;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::build_default_catalog;
pub use config::Config;
pub use schedule::{generate_schedule, Frequency};
pub use completion::CompletionKey;
pub use cycle::CycleState;
pub use stats::{ExerciseSummary, Insight, MuscleGroupSummary, Trend};
pub use store::{FileStore, UserStore};
pub use engine::{CycleProgress, Engine, StartedCycle};

//! Configuration file support for repcycle.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/repcycle/config.toml`.

use crate::schedule::{Frequency, MAX_SCHEDULE_DAYS};
use crate::{Catalog, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub cycle: CycleConfig,

    #[serde(default)]
    pub rotation: RotationConfig,

    #[serde(default)]
    pub insights: InsightsConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Cycle shape and plan generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CycleConfig {
    #[serde(default = "default_length_days")]
    pub length_days: u32,

    #[serde(default = "default_microcycle_days")]
    pub microcycle_days: u32,

    #[serde(default)]
    pub frequency: Frequency,

    #[serde(default = "default_exercises_per_slot")]
    pub exercises_per_slot: usize,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            length_days: default_length_days(),
            microcycle_days: default_microcycle_days(),
            frequency: Frequency::default(),
            exercises_per_slot: default_exercises_per_slot(),
        }
    }
}

/// Exercise rotation
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct RotationConfig {
    /// Number of most recent cycles consulted. `None` means all retained history.
    #[serde(default)]
    pub window: Option<usize>,
}

/// Thresholds for advisory insights
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InsightsConfig {
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,

    #[serde(default = "default_balance_tolerance")]
    pub balance_tolerance: f64,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            stale_after_days: default_stale_after_days(),
            balance_tolerance: default_balance_tolerance(),
        }
    }
}

/// Optional replacement for the built-in catalog
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct CatalogConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("repcycle")
}

fn default_length_days() -> u32 {
    30
}

fn default_microcycle_days() -> u32 {
    7
}

fn default_exercises_per_slot() -> usize {
    4
}

fn default_stale_after_days() -> i64 {
    14
}

fn default_balance_tolerance() -> f64 {
    0.2
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("repcycle").join("config.toml")
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.cycle.length_days == 0 {
            return Err(Error::Config("cycle.length_days must be at least 1".into()));
        }
        if self.cycle.length_days as usize > MAX_SCHEDULE_DAYS {
            return Err(Error::Config(format!(
                "cycle.length_days must be at most {}",
                MAX_SCHEDULE_DAYS
            )));
        }
        if self.cycle.microcycle_days == 0 {
            return Err(Error::Config(
                "cycle.microcycle_days must be at least 1".into(),
            ));
        }
        if self.cycle.exercises_per_slot == 0 {
            return Err(Error::Config(
                "cycle.exercises_per_slot must be at least 1".into(),
            ));
        }
        if self.rotation.window == Some(0) {
            return Err(Error::Config(
                "rotation.window must be at least 1 (omit it to use all history)".into(),
            ));
        }
        if !(self.insights.balance_tolerance >= 0.0) {
            return Err(Error::Config(
                "insights.balance_tolerance must be non-negative".into(),
            ));
        }
        Ok(())
    }

    /// The catalog this configuration selects: the file at `catalog.path`, or the built-in one
    pub fn load_catalog(&self) -> Result<Catalog> {
        match &self.catalog.path {
            Some(path) => Catalog::load_from(path),
            None => Ok(crate::catalog::get_default_catalog().clone()),
        }
    }
}

//! Pipeline configuration file.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tasman::UniverseConfig;
use tasman::risk::{EntityVolatilityConfig, ForecastConfig};
use thiserror::Error;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The file is not a valid configuration.
    #[error("invalid config {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

/// Settings for every stage. Missing sections take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct PipelineConfig {
    pub(crate) universe: UniverseConfig,
    pub(crate) forecast: ForecastConfig,
    pub(crate) entity_volatility: EntityVolatilityConfig,
}

/// Command-line values that override the configuration file.
#[derive(Debug, Clone, Default)]
pub(crate) struct Overrides {
    pub(crate) target_size: Option<usize>,
    pub(crate) test_end: Option<NaiveDate>,
    pub(crate) horizon: Option<usize>,
    pub(crate) sequential: bool,
}

impl PipelineConfig {
    /// Read a JSON configuration file.
    pub(crate) fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load `path` if given, else defaults, then apply `overrides`.
    pub(crate) fn resolve(path: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        Ok(config)
    }

    fn apply(&mut self, overrides: &Overrides) {
        if let Some(target_size) = overrides.target_size {
            self.universe.target_size = target_size;
        }
        if let Some(test_end) = overrides.test_end {
            self.forecast.test_end = Some(test_end);
        }
        if let Some(horizon) = overrides.horizon {
            self.forecast.horizon_days = horizon;
        }
        if overrides.sequential {
            self.forecast.parallel = false;
        }
    }
}

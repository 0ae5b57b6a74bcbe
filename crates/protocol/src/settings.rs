use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("min_search_length must be at least 1")]
    SearchLength,
}

/// User-tunable options of the call-tree views.
///
/// Every field has a default, so a partial JSON object (or `{}`) is a valid
/// settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallTreeSettings {
    /// Merge all call-path instances of the inspected function into one node.
    pub combine_instances: bool,
    /// Render names as `module!function`.
    pub prepend_module: bool,
    /// How many levels "expand hottest path" descends.
    pub hot_path_depth: usize,
    /// Search strings shorter than this clear the search instead.
    pub min_search_length: usize,
    /// Duration of one sample when sample counts are turned into weights.
    pub sample_interval_us: u64,
}

impl Default for CallTreeSettings {
    fn default() -> Self {
        Self {
            combine_instances: false,
            prepend_module: false,
            hot_path_depth: 10,
            min_search_length: 2,
            sample_interval_us: 1_000,
        }
    }
}

impl CallTreeSettings {
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(text)?;
        if settings.min_search_length == 0 {
            return Err(SettingsError::SearchLength);
        }
        Ok(settings)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_micros(self.sample_interval_us)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

//! Engine tuning configuration
//!
//! Loaded from TOML or built from defaults; validated before a session
//! accepts it.

use crate::core::types::{MemoryResult, ScanError};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_worker_threads() -> usize {
    num_cpus::get().clamp(1, 8)
}

fn default_display_threshold() -> u64 {
    10_000
}

fn default_progress_interval_ms() -> u64 {
    100
}

/// Tuning knobs for scan passes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Fixed number of worker threads per scan pass
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Sparse result count below which merged results are kept in memory
    #[serde(default = "default_display_threshold")]
    pub display_threshold: u64,

    /// Interval of the controller's worker-progress polling loop
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            worker_threads: default_worker_threads(),
            display_threshold: default_display_threshold(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl ScanConfig {
    /// Parses a configuration from TOML text, filling omitted fields with
    /// defaults
    pub fn from_toml_str(text: &str) -> MemoryResult<Self> {
        let config: ScanConfig = toml::from_str(text)
            .map_err(|e| ScanError::Config(format!("TOML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file from disk
    pub fn load<P: AsRef<Path>>(path: P) -> MemoryResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ScanError::Config(format!(
                "cannot read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks the configuration for usable values
    pub fn validate(&self) -> MemoryResult<()> {
        if self.worker_threads == 0 {
            return Err(ScanError::Config(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.worker_threads > 256 {
            return Err(ScanError::Config(
                "worker_threads larger than 256 is not sensible".to_string(),
            ));
        }
        if self.progress_interval_ms == 0 {
            return Err(ScanError::Config(
                "progress_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

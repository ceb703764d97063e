//! Pipeline Settings
//!
//! Queue capacities and timer periods, loadable from a JSON file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Decoded video frames held ahead of the playback clock.
    pub video_queue_capacity: usize,
    /// Decoded audio blocks held ahead of the playback clock.
    pub audio_queue_capacity: usize,
    /// Upper bound on how long the decode worker sleeps between checks for
    /// seeks, shutdown and free queue space.
    pub worker_poll_interval_ms: u64,
    /// Playback clock timer period.
    pub tick_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            video_queue_capacity: 24,
            audio_queue_capacity: 64,
            worker_poll_interval_ms: 10,
            tick_interval_ms: 5,
        }
    }
}

impl PipelineConfig {
    /// Read and validate a JSON config file. Missing keys take defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.video_queue_capacity == 0 {
            return Err(ConfigError::Invalid("video_queue_capacity must be at least 1".into()));
        }
        if self.audio_queue_capacity == 0 {
            return Err(ConfigError::Invalid("audio_queue_capacity must be at least 1".into()));
        }
        if self.worker_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("worker_poll_interval_ms must be at least 1".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be at least 1".into()));
        }
        Ok(())
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

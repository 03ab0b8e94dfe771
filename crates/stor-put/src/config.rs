//! Upload configuration

use crate::progress::ProgressMode;
use serde::{Deserialize, Serialize};

/// Knobs shared by every upload of a process
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Total attempts per upload, including the first
    pub max_attempts: u32,
    /// Delay before the first retry (milliseconds)
    pub initial_delay_ms: u64,
    /// Ceiling for any retry delay (milliseconds)
    pub max_delay_ms: u64,
    /// Delay growth factor between retries
    pub backoff_multiplier: f64,
    /// When to draw the progress bar
    pub progress: ProgressMode,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            progress: ProgressMode::Auto,
        }
    }
}

impl UploadConfig {
    /// Set the attempt budget
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the progress mode
    pub fn with_progress(mut self, progress: ProgressMode) -> Self {
        self.progress = progress;
        self
    }
}

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use log::{LevelFilter, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Engine settings, read from JSON. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Task threads to start; `None` uses the available hardware parallelism.
    pub worker_threads: Option<usize>,
    /// Longest an idle task thread sleeps before re-checking its running flag.
    pub idle_wait_ms: u64,
    /// Frame deltas are clamped to this.
    pub max_frame_delta_ms: u64,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            idle_wait_ms: 10,
            max_frame_delta_ms: 250,
            log_level: "info".into(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Resolved pool size. Never zero unless explicitly configured as zero,
    /// which the task manager rejects.
    pub fn worker_thread_count(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn max_frame_delta(&self) -> Duration {
        Duration::from_millis(self.max_frame_delta_ms)
    }

    pub fn level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or_else(|_| {
            warn!("Unknown log level {:?}, using info", self.log_level);
            LevelFilter::Info
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = EngineConfig::from_json(r#"{ "workerThreads": 3 }"#).unwrap();
        assert_eq!(config.worker_threads, Some(3));
        assert_eq!(config.worker_thread_count(), 3);
        assert_eq!(config.idle_wait(), Duration::from_millis(10));
        assert_eq!(config.max_frame_delta(), Duration::from_millis(250));
    }

    #[test]
    fn test_default_thread_count_is_at_least_one() {
        assert!(EngineConfig::default().worker_thread_count() >= 1);
    }

    #[test]
    fn test_level_filter_parsing() {
        let mut config = EngineConfig::default();
        config.log_level = "debug".into();
        assert_eq!(config.level_filter(), LevelFilter::Debug);
        config.log_level = "chatty".into();
        assert_eq!(config.level_filter(), LevelFilter::Info);
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(EngineConfig::from_json("[]").is_err());
    }
}

//! Batch policy configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}={value}: {reason}")]
    InvalidVar {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid batch config: {0}")]
    Invalid(String),
}

/// Policy knobs for running a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Upper bound on concurrent workers per batch.
    pub max_concurrency: usize,
    /// Timeout around a single conversion call (milliseconds).
    pub item_timeout_ms: u64,
    /// Deadline for the whole worker pool (milliseconds).
    pub batch_deadline_ms: u64,
    /// How long a job stays in the registry after creation (seconds).
    pub retention_secs: u64,
    /// How often stale jobs are evicted (seconds).
    pub eviction_interval_secs: u64,
    /// Capacity of each progress event channel.
    pub event_capacity: usize,
    /// File extensions (without the dot) picked up from a bundle. Empty means all files.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include_extensions: Vec<String>,
    /// Extension given to converted artifacts.
    pub target_extension: String,
    /// Ordered step names for every job. The orchestrator drives the first three.
    pub step_names: Vec<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            item_timeout_ms: 120_000,
            batch_deadline_ms: 600_000,
            retention_secs: 3_600,
            eviction_interval_secs: 300,
            event_capacity: 1024,
            include_extensions: Vec::new(),
            target_extension: "out".to_string(),
            step_names: vec![
                "extract".to_string(),
                "convert".to_string(),
                "package".to_string(),
            ],
        }
    }
}

impl BatchConfig {
    pub fn item_timeout(&self) -> Duration {
        Duration::from_millis(self.item_timeout_ms)
    }

    pub fn batch_deadline(&self) -> Duration {
        Duration::from_millis(self.batch_deadline_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_batch_deadline(mut self, deadline: Duration) -> Self {
        self.batch_deadline_ms = deadline.as_millis() as u64;
        self
    }

    pub fn with_include_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_target_extension(mut self, extension: impl Into<String>) -> Self {
        self.target_extension = extension.into();
        self
    }

    /// Whether a file with this extension belongs in a batch.
    pub fn includes_extension(&self, extension: Option<&str>) -> bool {
        if self.include_extensions.is_empty() {
            return true;
        }
        extension.is_some_and(|ext| {
            self.include_extensions
                .iter()
                .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
    }

    /// Build a config from defaults overridden by environment variables.
    ///
    /// - `BATCH_MAX_CONCURRENCY`
    /// - `BATCH_ITEM_TIMEOUT_SECS`, `BATCH_DEADLINE_SECS`
    /// - `BATCH_RETENTION_SECS`, `BATCH_EVICTION_INTERVAL_SECS`
    /// - `BATCH_INCLUDE_EXTENSIONS` (comma separated, e.g. `sas,sql`)
    /// - `BATCH_TARGET_EXTENSION`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = env_parse::<usize>("BATCH_MAX_CONCURRENCY")? {
            cfg.max_concurrency = v;
        }
        if let Some(v) = env_parse::<u64>("BATCH_ITEM_TIMEOUT_SECS")? {
            cfg.item_timeout_ms = v.saturating_mul(1000);
        }
        if let Some(v) = env_parse::<u64>("BATCH_DEADLINE_SECS")? {
            cfg.batch_deadline_ms = v.saturating_mul(1000);
        }
        if let Some(v) = env_parse::<u64>("BATCH_RETENTION_SECS")? {
            cfg.retention_secs = v;
        }
        if let Some(v) = env_parse::<u64>("BATCH_EVICTION_INTERVAL_SECS")? {
            cfg.eviction_interval_secs = v;
        }
        if let Some(v) = env_string("BATCH_INCLUDE_EXTENSIONS") {
            cfg.include_extensions = v
                .split(',')
                .map(|ext| ext.trim().trim_start_matches('.').to_string())
                .filter(|ext| !ext.is_empty())
                .collect();
        }
        if let Some(v) = env_string("BATCH_TARGET_EXTENSION") {
            cfg.target_extension = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Check the invariants the worker pool relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.item_timeout_ms == 0 || self.batch_deadline_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if self.item_timeout_ms >= self.batch_deadline_ms {
            return Err(ConfigError::Invalid(format!(
                "item timeout ({}ms) must be shorter than the batch deadline ({}ms)",
                self.item_timeout_ms, self.batch_deadline_ms
            )));
        }
        if self.step_names.len() < 3 {
            return Err(ConfigError::Invalid(
                "at least three steps (extract, convert, package) are required".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be non-zero".into()));
        }
        Ok(())
    }
}

fn env_string(var: &'static str) -> Option<String> {
    std::env::var(var).ok().and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_parse<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(var) {
        None => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidVar {
                var,
                value,
                reason: e.to_string(),
            }),
    }
}

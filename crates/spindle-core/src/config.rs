//! Pool configuration.
//!
//! Sources, later wins:
//! 1. `PoolConfig::default()`
//! 2. JSON (`from_json_str`) or environment (`from_env`)
//! 3. builder setters (`with_*`), e.g. from CLI flags

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ENV_QUEUE_CAPACITY: &str = "SPINDLE_QUEUE_CAPACITY";
pub const ENV_WORKERS: &str = "SPINDLE_WORKERS";
pub const ENV_POOL_NAME: &str = "SPINDLE_POOL_NAME";

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_POOL_NAME: &str = "spindle";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of queued (not yet claimed) tasks. Must be >= 1.
    pub queue_capacity: usize,

    /// Number of workers. Must be >= 1.
    pub worker_count: usize,

    /// Shows up in logs and `PoolStatus`.
    pub name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            worker_count: default_worker_count(),
            name: DEFAULT_POOL_NAME.to_string(),
        }
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

impl PoolConfig {
    pub fn new(queue_capacity: usize, worker_count: usize) -> Self {
        Self {
            queue_capacity,
            worker_count,
            ..Self::default()
        }
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.worker_count == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(())
    }

    /// Parse from JSON. Missing fields fall back to defaults.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `SPINDLE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_QUEUE_CAPACITY) {
            config.queue_capacity = parse_count(ENV_QUEUE_CAPACITY, value)?;
        }
        if let Some(value) = lookup(ENV_WORKERS) {
            config.worker_count = parse_count(ENV_WORKERS, value)?;
        }
        if let Some(value) = lookup(ENV_POOL_NAME) {
            config.name = value;
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_count(var: &'static str, value: String) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use rstest::rstest;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn default_is_valid() {
        let config = PoolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(config.worker_count >= 1);
    }

    #[rstest]
    #[case::zero_capacity(0, 1)]
    #[case::zero_workers(1, 0)]
    fn zero_sizes_are_rejected(#[case] capacity: usize, #[case] workers: usize) {
        assert!(PoolConfig::new(capacity, workers).validate().is_err());
    }

    #[test]
    fn env_overrides_defaults() {
        let config = PoolConfig::from_lookup(lookup_from(&[
            (ENV_QUEUE_CAPACITY, "8"),
            (ENV_WORKERS, " 3 "),
            (ENV_POOL_NAME, "ingest"),
        ]))
        .unwrap();

        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.name, "ingest");
    }

    #[test]
    fn env_with_garbage_is_reported() {
        let err = PoolConfig::from_lookup(lookup_from(&[(ENV_WORKERS, "many")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv { var: ENV_WORKERS, ref value } if value == "many"
        ));
    }

    #[test]
    fn env_with_zero_capacity_fails_validation() {
        let err =
            PoolConfig::from_lookup(lookup_from(&[(ENV_QUEUE_CAPACITY, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroCapacity));
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = PoolConfig::from_json_str(r#"{ "worker_count": 2 }"#).unwrap();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.name, DEFAULT_POOL_NAME);
    }

    #[test]
    fn json_errors_are_wrapped() {
        let err = PoolConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn builder_setters_override() {
        let config = PoolConfig::default()
            .with_queue_capacity(2)
            .with_worker_count(1)
            .with_name("demo");
        assert_eq!(config, PoolConfig::new(2, 1).with_name("demo"));
    }
}

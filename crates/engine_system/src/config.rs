//! World configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How Systems are executed within one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One System after another on the calling thread, in dependency order.
    #[default]
    Sequential,
    /// Conflict-free stages, each spread over up to `max_workers` threads.
    Parallel {
        /// Upper bound on threads used for one stage.
        max_workers: usize,
    },
}

/// Errors produced while loading a [`WorldConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("invalid world config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid world config: {0}")]
    Invalid(String),
}

/// Configuration for one world and its tick loop.
///
/// ```toml
/// tick_rate = 30.0
/// max_ticks = 600
/// command_capacity = 256
///
/// [execution]
/// mode = "parallel"
/// max_workers = 4
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
    /// System execution strategy.
    pub execution: ExecutionMode,
    /// Initial capacity of the command queue.
    pub command_capacity: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
            execution: ExecutionMode::Sequential,
            command_capacity: 64,
        }
    }
}

impl WorldConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed TOML, [`ConfigError::Invalid`] on
    /// out-of-range values.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: WorldConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tick_period()?;
        if let ExecutionMode::Parallel { max_workers } = self.execution
            && max_workers == 0
        {
            return Err(ConfigError::Invalid(
                "execution.max_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Wall-clock length of one tick.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if `tick_rate` is not positive and finite, or
    /// so small that one tick does not fit a [`Duration`].
    pub fn tick_period(&self) -> Result<Duration, ConfigError> {
        if !(self.tick_rate.is_finite() && self.tick_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "tick_rate must be positive, got {}",
                self.tick_rate
            )));
        }
        Duration::try_from_secs_f64(1.0 / self.tick_rate).map_err(|_| {
            ConfigError::Invalid(format!("tick_rate {} is too small", self.tick_rate))
        })
    }

    /// Fixed timestep in seconds.
    #[must_use]
    pub fn delta(&self) -> f32 {
        (1.0 / self.tick_rate) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = WorldConfig::from_toml_str("").unwrap();
        assert_eq!(config, WorldConfig::default());
        assert_eq!(config.execution, ExecutionMode::Sequential);
    }

    #[test]
    fn test_parallel_section() {
        let config = WorldConfig::from_toml_str(
            r#"
            tick_rate = 30.0
            max_ticks = 10

            [execution]
            mode = "parallel"
            max_workers = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.max_ticks, 10);
        assert_eq!(config.execution, ExecutionMode::Parallel { max_workers: 3 });
        assert!((config.delta() - 1.0 / 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_zero_workers() {
        let err = WorldConfig::from_toml_str(
            r#"
            [execution]
            mode = "parallel"
            max_workers = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_non_positive_tick_rate() {
        let err = WorldConfig::from_toml_str("tick_rate = 0.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_tick_rate_too_small_for_duration() {
        let err = WorldConfig::from_toml_str("tick_rate = 1e-20\nmax_ticks = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let config = WorldConfig {
            tick_rate: 4.0,
            ..WorldConfig::default()
        };
        assert_eq!(config.tick_period().unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_malformed_toml() {
        let err = WorldConfig::from_toml_str("tick_rate = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}

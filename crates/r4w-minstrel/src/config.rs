//! # Rate-Control Configuration
//!
//! YAML-loadable parameters for the Minstrel-HT manager.
//!
//! ## Example Configuration
//!
//! ```yaml
//! update_interval_ms: 100
//! look_around_rate: 10.0
//! ewma_level: 75.0
//! sample_columns: 10
//! frame_length: 1200
//! ```
//!
//! Fields left out of the file keep their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to read or write a configuration file
    #[error("failed to access config: {0}")]
    Io(String),
    /// Failed to parse configuration
    #[error("failed to parse config: {0}")]
    Parse(String),
    /// Invalid configuration value
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Minstrel-HT tuning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinstrelHtConfig {
    /// Interval between statistics updates in milliseconds
    pub update_interval_ms: u64,
    /// Target share of frames (percent) spent sampling other rates
    pub look_around_rate: f64,
    /// Weight (percent) of the previous EWMA value in each update
    pub ewma_level: f64,
    /// Number of columns in each sample table
    pub sample_columns: usize,
    /// Reference frame length in bytes used for ideal durations
    pub frame_length: u32,
    /// Ceiling for the worst-case time of one frame including retries (µs)
    pub max_retry_time_us: u64,
    /// Seed for the per-run random stream
    pub seed: u64,
}

impl Default for MinstrelHtConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 100,
            look_around_rate: 10.0,
            ewma_level: 75.0,
            sample_columns: 10,
            frame_length: 1200,
            max_retry_time_us: 6000,
            seed: 1,
        }
    }
}

impl MinstrelHtConfig {
    /// Statistics update interval as a duration
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    /// Retry-chain time ceiling as a duration
    pub fn max_retry_time(&self) -> Duration {
        Duration::from_micros(self.max_retry_time_us)
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.update_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "update_interval_ms must be > 0".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&self.look_around_rate) {
            return Err(ConfigError::Validation(
                "look_around_rate must be 0-100".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&self.ewma_level) {
            return Err(ConfigError::Validation(
                "ewma_level must be 0-100".to_string(),
            ));
        }

        if self.sample_columns == 0 {
            return Err(ConfigError::Validation(
                "sample_columns must be > 0".to_string(),
            ));
        }

        if self.frame_length == 0 {
            return Err(ConfigError::Validation(
                "frame_length must be > 0".to_string(),
            ));
        }

        if self.max_retry_time_us == 0 {
            return Err(ConfigError::Validation(
                "max_retry_time_us must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MinstrelHtConfig::default();
        assert_eq!(config.update_interval(), Duration::from_millis(100));
        assert_eq!(config.look_around_rate, 10.0);
        assert_eq!(config.ewma_level, 75.0);
        assert_eq!(config.sample_columns, 10);
        assert_eq!(config.frame_length, 1200);
        assert_eq!(config.max_retry_time(), Duration::from_millis(6));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
look_around_rate: 20.0
sample_columns: 4
"#;

        let config = MinstrelHtConfig::parse(yaml).unwrap();
        assert_eq!(config.look_around_rate, 20.0);
        assert_eq!(config.sample_columns, 4);
        // Defaults should be applied
        assert_eq!(config.ewma_level, 75.0);
        assert_eq!(config.frame_length, 1200);
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        let err = MinstrelHtConfig::parse("ewma_level: 150.0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let err = MinstrelHtConfig::parse("sample_columns: [1, 2]").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation() {
        let mut config = MinstrelHtConfig::default();
        config.update_interval_ms = 0;
        assert!(config.validate().is_err());

        config = MinstrelHtConfig::default();
        config.look_around_rate = -1.0;
        assert!(config.validate().is_err());

        config = MinstrelHtConfig::default();
        config.frame_length = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!(
            "r4w-minstrel-config-{}.yaml",
            std::process::id()
        ));
        let config = MinstrelHtConfig {
            ewma_level: 50.0,
            seed: 99,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = MinstrelHtConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_missing_file() {
        let err = MinstrelHtConfig::load_from(Path::new("/nonexistent/minstrel.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

//! Configuration module for the packet tools
//!
//! Supports loading configuration from TOML files. Every section and field
//! has a default, so an empty file (or no file) is a valid configuration.
//!
//! # Example
//! ```ignore
//! let config = Config::load("dynapse.toml")?;
//! let emulator = Emulator::new(config.emulator.clone())?;
//! ```

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::common::bits::layout::CHIP_ID_MAX;
use crate::emulator::EmulatorConfig;
use crate::recorder::MAX_PACKET_CAPACITY;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub emulator: EmulatorConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let emu = &self.emulator;
        if emu.packet_capacity <= 0 || emu.packet_capacity > MAX_PACKET_CAPACITY {
            return Err(ConfigError::invalid(
                "emulator.packet_capacity",
                format!(
                    "must be 1-{}, got {}",
                    MAX_PACKET_CAPACITY, emu.packet_capacity
                ),
            ));
        }
        if emu.num_chips == 0 || emu.num_chips > CHIP_ID_MAX + 1 {
            return Err(ConfigError::invalid(
                "emulator.num_chips",
                format!("must be 1-{}, got {}", CHIP_ID_MAX + 1, emu.num_chips),
            ));
        }
        if !(emu.mean_interval_us > 0.0) {
            return Err(ConfigError::invalid(
                "emulator.mean_interval_us",
                format!("must be positive, got {}", emu.mean_interval_us),
            ));
        }
        if !(0.0..=1.0).contains(&emu.invalidate_ratio) {
            return Err(ConfigError::invalid(
                "emulator.invalidate_ratio",
                format!("must be within [0, 1], got {}", emu.invalidate_ratio),
            ));
        }
        if emu.initial_ts_overflow < 0 {
            return Err(ConfigError::invalid(
                "emulator.initial_ts_overflow",
                format!("must not be negative, got {}", emu.initial_ts_overflow),
            ));
        }
        Ok(())
    }
}

/// Packet stream file settings
#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    /// Output file path
    #[serde(default = "default_output_path")]
    pub output_path: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
        }
    }
}

fn default_output_path() -> String {
    "./dynapse_config.dyn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.recorder.output_path, "./dynapse_config.dyn");
        assert_eq!(config.emulator.packet_capacity, 1024);
        assert_eq!(config.emulator.num_chips, 4);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[emulator]
source_id = 3
packet_capacity = 64
num_packets = 5
num_chips = 16
mean_interval_us = 25.0
invalidate_ratio = 0.1
initial_ts_overflow = 2
seed = 1234

[recorder]
output_path = "/data/run_0001.dyn"
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.emulator.source_id, 3);
        assert_eq!(config.emulator.packet_capacity, 64);
        assert_eq!(config.emulator.num_packets, 5);
        assert_eq!(config.emulator.num_chips, 16);
        assert!((config.emulator.mean_interval_us - 25.0).abs() < f64::EPSILON);
        assert!((config.emulator.invalidate_ratio - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.emulator.initial_ts_overflow, 2);
        assert_eq!(config.emulator.seed, Some(1234));
        assert_eq!(config.recorder.output_path, "/data/run_0001.dyn");
    }

    #[test]
    fn reject_invalid_values() {
        assert!(matches!(
            Config::from_toml("[emulator]\npacket_capacity = 0\n"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(Config::from_toml("[emulator]\nnum_chips = 17\n").is_err());
        assert!(Config::from_toml("[emulator]\nnum_chips = 0\n").is_err());
        assert!(Config::from_toml("[emulator]\ninvalidate_ratio = 1.5\n").is_err());
        assert!(Config::from_toml("[emulator]\nmean_interval_us = 0.0\n").is_err());
        assert!(Config::from_toml("[emulator]\ninitial_ts_overflow = -1\n").is_err());
    }

    #[test]
    fn packet_capacity_bounded_by_frame_size() {
        let at_limit = format!("[emulator]\npacket_capacity = {}\n", MAX_PACKET_CAPACITY);
        assert!(Config::from_toml(&at_limit).is_ok());

        let over = format!("[emulator]\npacket_capacity = {}\n", MAX_PACKET_CAPACITY + 1);
        assert!(matches!(
            Config::from_toml(&over),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "emulator.packet_capacity"
        ));
    }

    #[test]
    fn reject_malformed_toml() {
        assert!(matches!(
            Config::from_toml("[emulator\n"),
            Err(ConfigError::TomlError(_))
        ));
    }

    #[test]
    fn load_missing_file() {
        let result = Config::load("/nonexistent/dynapse.toml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}

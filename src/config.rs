//! Run configuration.
//!
//! [`PollConfig`] is what the core reads; [`ProbeConfig`] wraps it with the
//! mode switches the command-line layer decides on. Both deserialize from TOML
//! with every field optional:
//!
//! ```toml
//! list_only = false
//! wait_for_press = true
//!
//! [poll]
//! interval_us = 20000
//! axis_min = -1000
//! axis_max = 1000
//! chosen_device_index = 0
//! verbose = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings consumed by sessions and the poll loop. Read-only to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Suspension between poll iterations, in microseconds.
    pub interval_us: u64,
    /// Range applied to every axis during object enumeration.
    pub axis_min: i32,
    pub axis_max: i32,
    /// Index into the device catalog of the device to poll.
    pub chosen_device_index: usize,
    /// Log each enumerated device object.
    pub verbose: bool,
    /// Pause between acquire retries after the device reports lost input.
    /// `0` retries immediately (yielding the thread between attempts).
    pub acquire_backoff_us: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_us: 0,
            axis_min: -1000,
            axis_max: 1000,
            chosen_device_index: 0,
            verbose: false,
            acquire_backoff_us: 0,
        }
    }
}

impl PollConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.axis_min >= self.axis_max {
            return Err(ConfigError::InvalidAxisRange {
                min: self.axis_min,
                max: self.axis_max,
            });
        }
        Ok(())
    }
}

/// Full run configuration as handed over by the command-line layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub poll: PollConfig,
    /// Only list devices; never open a session.
    pub list_only: bool,
    /// Only consider force-feedback-capable devices.
    pub force_feedback_only: bool,
    /// Hold back state delivery until the first button press.
    pub wait_for_press: bool,
    /// Autocenter setting to apply after opening; `None` leaves the driver default.
    pub autocenter: Option<bool>,
    /// How long each test effect plays before it is released.
    pub effect_dwell_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            list_only: true,
            force_feedback_only: false,
            wait_for_press: true,
            autocenter: None,
            effect_dwell_ms: 1000,
        }
    }
}

impl ProbeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: ProbeConfig = toml::from_str(input)?;
        config.poll.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_classic_tool() {
        let cfg = PollConfig::default();
        assert_eq!(cfg.axis_min, -1000);
        assert_eq!(cfg.axis_max, 1000);
        assert_eq!(cfg.chosen_device_index, 0);
        assert!(!cfg.verbose);
        assert!(ProbeConfig::default().list_only);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg = ProbeConfig::from_toml_str(
            r#"
            list_only = false
            autocenter = false

            [poll]
            interval_us = 1000
            chosen_device_index = 1
            "#,
        )
        .unwrap();
        assert!(!cfg.list_only);
        assert_eq!(cfg.autocenter, Some(false));
        assert_eq!(cfg.poll.interval_us, 1000);
        assert_eq!(cfg.poll.chosen_device_index, 1);
        assert_eq!(cfg.poll.axis_max, 1000);
        assert!(cfg.wait_for_press);
    }

    #[test]
    fn rejects_empty_axis_range() {
        let err = ProbeConfig::from_toml_str("[poll]\naxis_min = 10\naxis_max = 10\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAxisRange { min: 10, max: 10 }));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = ProbeConfig::from_toml_str("poll = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}

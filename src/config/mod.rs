//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - CLI arguments
//!
//! Every section is optional in the file; missing values fall back to the
//! defaults below.
//!
//! ```toml
//! [gesture]
//! edge_thickness_base = 12.0
//! trigger_distance_base = 60.0
//! perpendicular_tolerance_base = 24.0
//! timeout_base_ms = 140
//! default_sensitivity = 2
//!
//! [filter]
//! queue_capacity = 32
//! shift_aborted_synthesis = false
//!
//! [display]
//! width = 1080
//! height = 1920
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod types;

pub use types::{DisplayConfig, FilterConfig, GestureConfig, LoggingConfig};

use crate::gesture::tracker::MAX_SENSITIVITY;
use crate::service::ServiceOptions;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Gesture recognition configuration
    #[serde(default)]
    pub gesture: GestureConfig,
    /// Input filter configuration
    #[serde(default)]
    pub filter: FilterConfig,
    /// Display configuration
    #[serde(default)]
    pub display: DisplayConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Result<Self> {
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let gesture = &self.gesture;

        if !is_positive(gesture.edge_thickness_base) {
            anyhow::bail!(
                "edge_thickness_base must be positive: {}",
                gesture.edge_thickness_base
            );
        }
        if !is_positive(gesture.trigger_distance_base) {
            anyhow::bail!(
                "trigger_distance_base must be positive: {}",
                gesture.trigger_distance_base
            );
        }
        if !is_positive(gesture.perpendicular_tolerance_base) {
            anyhow::bail!(
                "perpendicular_tolerance_base must be positive: {}",
                gesture.perpendicular_tolerance_base
            );
        }
        if gesture.timeout_base_ms == 0 {
            anyhow::bail!("timeout_base_ms must be positive");
        }
        if gesture.touch_tolerance < 0 {
            anyhow::bail!(
                "touch_tolerance cannot be negative: {}",
                gesture.touch_tolerance
            );
        }
        if gesture.default_sensitivity > MAX_SENSITIVITY {
            anyhow::bail!(
                "default_sensitivity ({}) must be between 0 and {}",
                gesture.default_sensitivity,
                MAX_SENSITIVITY
            );
        }

        if self.filter.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be positive");
        }

        if self.display.width == 0 || self.display.height == 0 {
            anyhow::bail!(
                "Invalid display size: {}x{}",
                self.display.width,
                self.display.height
            );
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(
        mut self,
        display: Option<(u32, u32)>,
        sensitivity: Option<u8>,
        shift_aborted_synthesis: bool,
    ) -> Self {
        if let Some((width, height)) = display {
            self.display.width = width;
            self.display.height = height;
        }
        if let Some(sensitivity) = sensitivity {
            self.gesture.default_sensitivity = sensitivity;
        }
        if shift_aborted_synthesis {
            self.filter.shift_aborted_synthesis = true;
        }
        self
    }

    /// Convert to service construction parameters
    ///
    /// | Config | Service |
    /// |--------|---------|
    /// | gesture.*_base, touch_tolerance | settings |
    /// | gesture.default_sensitivity | default_sensitivity |
    /// | filter.* | filter |
    /// | display.* | display |
    pub fn to_service_options(&self) -> ServiceOptions {
        ServiceOptions {
            settings: self.gesture.tracker_settings(),
            filter: (&self.filter).into(),
            default_sensitivity: self.gesture.default_sensitivity,
            display: (&self.display).into(),
        }
    }
}

fn is_positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = Config::default_config().unwrap();
        assert_eq!(config.gesture.edge_thickness_base, 12.0);
        assert_eq!(config.gesture.default_sensitivity, 2);
        assert_eq!(config.filter.queue_capacity, 32);
        assert_eq!(config.display.width, 1080);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gesture]\ndefault_sensitivity = 4\n\n[display]\nwidth = 800\nheight = 600").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.gesture.default_sensitivity, 4);
        assert_eq!(config.gesture.trigger_distance_base, 60.0);
        assert_eq!(config.display.width, 800);
        assert!(!config.filter.shift_aborted_synthesis);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gesture]\ndefault_sensitivity = 7").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_config_validation_zero_base() {
        let mut config = Config::default_config().unwrap();
        config.gesture.trigger_distance_base = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default_config().unwrap();
        config.gesture.timeout_base_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_display() {
        let mut config = Config::default_config().unwrap();
        config.display.height = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = Config::default_config().unwrap();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_overrides() {
        let config = Config::default_config()
            .unwrap()
            .with_overrides(Some((720, 1280)), Some(3), true);
        assert_eq!(config.display.width, 720);
        assert_eq!(config.gesture.default_sensitivity, 3);
        assert!(config.filter.shift_aborted_synthesis);
    }

    #[test]
    fn test_to_service_options() {
        let mut config = Config::default_config().unwrap();
        config.gesture.timeout_base_ms = 200;
        let options = config.to_service_options();
        assert_eq!(options.settings.timeout_base, Duration::from_millis(200));
        assert_eq!(options.display.height, 1920);
        assert_eq!(options.filter.queue_capacity, 32);
    }
}

//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::gesture::filter::FilterOptions;
use crate::gesture::queue::DEFAULT_QUEUE_CAPACITY;
use crate::gesture::tracker::{DisplayInfo, TrackerSettings};

/// Gesture recognition configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Edge band thickness in pixels before sensitivity scaling
    pub edge_thickness_base: f32,

    /// Inward travel needed to activate, in pixels
    pub trigger_distance_base: f32,

    /// Allowed drift along the edge, in pixels
    pub perpendicular_tolerance_base: f32,

    /// Gesture timeout in milliseconds
    pub timeout_base_ms: u64,

    /// Slack behind the finger before it counts as moving back, in pixels
    pub touch_tolerance: i32,

    /// Sensitivity when no listener requests one (0-4)
    pub default_sensitivity: u8,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            edge_thickness_base: 12.0,
            trigger_distance_base: 60.0,
            perpendicular_tolerance_base: 24.0,
            timeout_base_ms: 140,
            touch_tolerance: 3,
            default_sensitivity: 2,
        }
    }
}

impl GestureConfig {
    /// Tracker geometry for these settings
    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            edge_thickness_base: self.edge_thickness_base,
            trigger_distance_base: self.trigger_distance_base,
            perpendicular_tolerance_base: self.perpendicular_tolerance_base,
            timeout_base: Duration::from_millis(self.timeout_base_ms),
            touch_tolerance: self.touch_tolerance,
        }
    }
}

/// Input filter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Event queue slots reserved up front
    pub queue_capacity: usize,

    /// Time-shift the replay when a sequence ends before synthesis
    pub shift_aborted_synthesis: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shift_aborted_synthesis: false,
        }
    }
}

impl From<&FilterConfig> for FilterOptions {
    fn from(config: &FilterConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            shift_aborted_synthesis: config.shift_aborted_synthesis,
        }
    }
}

/// Display geometry used until the windowing layer reports one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
        }
    }
}

impl From<&DisplayConfig> for DisplayInfo {
    fn from(config: &DisplayConfig) -> Self {
        DisplayInfo::new(config.width, config.height)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    pub level: String,

    /// Directory for log files (None = console only)
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

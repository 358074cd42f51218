//! Configuration file handling.
//!
//! Loads configuration from `<config dir>/asi-guide-capture/config.toml` or a custom path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::acquisition::DEFAULT_WATCHDOG_SLACK;
use crate::geometry::Rect;

/// Configuration file structure.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Camera driver settings.
    #[serde(default)]
    pub camera: CameraConfig,
    /// Capture loop settings for the binary.
    #[serde(default)]
    pub capture: CaptureConfig,
}

/// Settings consumed by [`crate::camera::ZwoCamera`].
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CameraConfig {
    /// Requested binning factor.
    pub binning: u32,
    /// Guide gain, 0-100.
    pub gain_percent: u32,
    /// Read sub-frames when the guider asks for them.
    pub use_subframes: bool,
    /// Device timeout in milliseconds.
    pub timeout_ms: u64,
    /// Extra watchdog allowance in milliseconds.
    pub watchdog_slack_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            binning: 1,
            gain_percent: 50,
            use_subframes: true,
            timeout_ms: 15_000,
            watchdog_slack_ms: u64::try_from(DEFAULT_WATCHDOG_SLACK.as_millis()).unwrap_or(10_000),
        }
    }
}

impl CameraConfig {
    /// Device timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Watchdog slack.
    #[must_use]
    pub const fn watchdog_slack(&self) -> Duration {
        Duration::from_millis(self.watchdog_slack_ms)
    }
}

/// Settings for the capture binary.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CaptureConfig {
    /// Exposure duration in milliseconds.
    pub exposure_ms: u32,
    /// Number of frames; 0 runs until interrupted.
    pub frames: u32,
    /// Sub-frame as `[x, y, width, height]`.
    pub subframe: Option<[i32; 4]>,
    /// Request dark subtraction.
    pub subtract_dark: bool,
    /// Request color reconstruction.
    pub reconstruct_color: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            exposure_ms: 1000,
            frames: 0,
            subframe: None,
            subtract_dark: false,
            reconstruct_color: false,
        }
    }
}

impl CaptureConfig {
    /// Requested sub-frame; an empty rectangle means full frame.
    #[must_use]
    pub fn subframe_rect(&self) -> Rect {
        self.subframe
            .map(|[x, y, width, height]| Rect::new(x, y, width, height))
            .unwrap_or_default()
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config file '{}': {source}", .path.display())]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`Config`].
    #[error("failed to parse config file '{}': {source}", .path.display())]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
}

impl Config {
    /// Load configuration from a file path, or the default path.
    ///
    /// Returns the default config if the file doesn't exist and an error if it
    /// exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map_or_else(default_path, Path::to_path_buf);

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let mut config: Self =
            toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?;
        config.camera.gain_percent = config.camera.gain_percent.min(100);
        Ok(config)
    }
}

/// Get the default config file path.
#[must_use]
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("asi-guide-capture")
        .join("config.toml")
}

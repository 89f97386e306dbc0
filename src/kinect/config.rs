use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::host::Atom;
use crate::kinect::error::{KinectError, Result};
use crate::kinect::types::{DepthProcessor, LogLevel};

/// Settable attribute names, in the order the host lists them.
pub const ATTRIBUTES: &[&str] = &["depth_processor", "rgb_frames", "logging", "frame_timeout_ms"];

/// Per-object configuration, exposed to the host as attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Decode pipeline; applied on the next `open`.
    pub depth_processor: DepthProcessor,
    /// Whether the color outlet is filled.
    pub rgb_frames: bool,
    /// Driver log verbosity.
    pub logging: LogLevel,
    /// Longest wait for a frame set before a tick gives up.
    pub frame_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            depth_processor: DepthProcessor::default(),
            rgb_frames: true,
            logging: LogLevel::default(),
            frame_timeout_ms: 2000,
        }
    }
}

impl Config {
    /// Load a config from a JSON file, returning defaults on a missing file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(config_error)?;
        let config: Self = serde_json::from_str(&contents).map_err(config_error)?;
        if config.frame_timeout_ms == 0 {
            return Err(KinectError::invalid_value("frame_timeout_ms", 0));
        }
        Ok(config)
    }

    /// Write the config as pretty JSON, replacing `path` in one rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(config_error)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(config_error)?;
        }
        let staged = path.with_extension("json.tmp");
        fs::write(&staged, json)
            .and_then(|()| fs::rename(&staged, path))
            .map_err(config_error)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    /// Set one attribute from a host atom.
    ///
    /// Invalid values leave the config untouched and return
    /// `InvalidConfigValue`.
    pub fn set_attr(&mut self, name: &str, value: &Atom) -> Result<()> {
        let code = value
            .as_int()
            .ok_or_else(|| KinectError::invalid_value(name, value))?;
        match name {
            "depth_processor" => self.depth_processor = DepthProcessor::try_from(code)?,
            "rgb_frames" => {
                self.rgb_frames = match code {
                    0 => false,
                    1 => true,
                    _ => return Err(KinectError::invalid_value(name, code)),
                }
            }
            "logging" => self.logging = LogLevel::try_from(code)?,
            "frame_timeout_ms" => {
                self.frame_timeout_ms = u64::try_from(code)
                    .ok()
                    .filter(|ms| *ms > 0)
                    .ok_or_else(|| KinectError::invalid_value(name, code))?
            }
            _ => return Err(KinectError::UnknownMessage(name.to_string())),
        }
        Ok(())
    }

    /// Current value of one attribute.
    pub fn get_attr(&self, name: &str) -> Result<Atom> {
        let value = match name {
            "depth_processor" => self.depth_processor.code(),
            "rgb_frames" => i64::from(self.rgb_frames),
            "logging" => self.logging.code(),
            "frame_timeout_ms" => i64::try_from(self.frame_timeout_ms).unwrap_or(i64::MAX),
            _ => return Err(KinectError::UnknownMessage(name.to_string())),
        };
        Ok(Atom::Int(value))
    }
}

fn config_error(e: impl std::fmt::Display) -> KinectError {
    KinectError::Config(e.to_string())
}

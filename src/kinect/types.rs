use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kinect::error::KinectError;

/// Depth stream resolution.
pub const DEPTH_WIDTH: usize = 512;
pub const DEPTH_HEIGHT: usize = 424;

/// Color stream resolution.
pub const RGB_WIDTH: usize = 1920;
pub const RGB_HEIGHT: usize = 1080;

/// Both streams deliver 4 bytes per pixel: one f32 depth sample or one BGRA
/// color pixel.
pub const FRAME_BYTES_PER_PIXEL: usize = 4;

/// Driver-side pipeline used to decode raw sensor data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum DepthProcessor {
    #[default]
    Cpu,
    OpenGl,
    OpenCl,
}

impl DepthProcessor {
    /// Map the host attribute code to a pipeline.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Cpu),
            1 => Some(Self::OpenGl),
            2 => Some(Self::OpenCl),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Cpu => 0,
            Self::OpenGl => 1,
            Self::OpenCl => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
            Self::OpenGl => "OpenGL",
            Self::OpenCl => "OpenCL",
        }
    }
}

impl fmt::Display for DepthProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i64> for DepthProcessor {
    type Error = KinectError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| KinectError::invalid_value("depth_processor", code))
    }
}

impl From<DepthProcessor> for i64 {
    fn from(processor: DepthProcessor) -> Self {
        processor.code()
    }
}

/// Driver log verbosity, `0` (silent) to `4` (debug).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum LogLevel {
    None,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Info),
            4 => Some(Self::Debug),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Error => 1,
            Self::Warning => 2,
            Self::Info => 3,
            Self::Debug => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    /// Equivalent `log` filter.
    pub fn level_filter(self) -> log::LevelFilter {
        match self {
            Self::None => log::LevelFilter::Off,
            Self::Error => log::LevelFilter::Error,
            Self::Warning => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
        }
    }
}

impl TryFrom<i64> for LogLevel {
    type Error = KinectError;

    fn try_from(code: i64) -> Result<Self, KinectError> {
        Self::from_code(code).ok_or_else(|| KinectError::invalid_value("logging", code))
    }
}

impl From<LogLevel> for i64 {
    fn from(level: LogLevel) -> Self {
        level.code()
    }
}

/// Streams a frame listener subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTypes {
    pub color: bool,
    pub depth: bool,
}

impl FrameTypes {
    pub const COLOR_AND_DEPTH: Self = Self {
        color: true,
        depth: true,
    };
}

/// Device session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Closed,
    Opening,
    Open,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Open => "open",
        }
    }
}

/// Outcome of an `open`/`close` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed,
    /// Already in the requested state; nothing was done.
    Unchanged,
}

/// Identification reported by an opened device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub serial: String,
    pub firmware: String,
}

use std::time::Duration;

use jit_matrix::TranscodeError;
use thiserror::Error;

/// Kinect capture errors.
///
/// None of these are fatal to the host: the object posts them to the
/// console and carries on.
#[derive(Debug, Error)]
pub enum KinectError {
    #[error("no Kinect v2 device connected")]
    NoDeviceConnected,

    #[error("could not create {0} pipeline")]
    PipelineCreationFailed(String),

    #[error("failed to open device: {0}")]
    DeviceOpenFailed(String),

    #[error("invalid value {value} for {attr}")]
    InvalidConfigValue { attr: String, value: String },

    #[error("unknown message: {0}")]
    UnknownMessage(String),

    #[error("no device open")]
    NotOpen,

    #[error("no frame within {0:?}")]
    FrameTimeout(Duration),

    #[error("cancelled by close")]
    Cancelled,

    #[error("driver error: {0}")]
    Driver(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),
}

impl KinectError {
    pub(crate) fn invalid_value(attr: &str, value: impl ToString) -> Self {
        Self::InvalidConfigValue {
            attr: attr.to_string(),
            value: value.to_string(),
        }
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, KinectError>;

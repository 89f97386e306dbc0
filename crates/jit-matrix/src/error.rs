use thiserror::Error;

/// Transcoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscodeError {
    #[error("invalid source frame: {0}")]
    InvalidSource(String),

    #[error("invalid destination matrix: {0}")]
    InvalidDestination(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, TranscodeError>;

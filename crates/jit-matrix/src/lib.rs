//! Host matrix buffers and frame-to-matrix transcoding.
//!
//! A matrix is the host's multi-plane, multi-dimensional buffer. Frames come
//! from the sensor driver as packed, interleaved pixels; the transcoder copies
//! them into a matrix honouring its per-dimension byte strides.

pub mod error;
pub mod matrix;
pub mod transcode;

pub use error::{Result, TranscodeError};
pub use matrix::{ElementType, Matrix, MatrixBuffer, MatrixData, MatrixInfo};
pub use transcode::{copy_color, copy_depth, ensure_layout, FrameLayout, SourceFrame};

//! `Freenect2Api` trait: the sensor driver boundary.
//!
//! The mock, the dummy driver and any native binding implement this trait,
//! so `Session<S>` runs the same code against all of them.

use std::time::Duration;

use jit_matrix::SourceFrame;

use crate::kinect::error::Result;
use crate::kinect::types::{
    DepthProcessor, DeviceInfo, FrameTypes, LogLevel, DEPTH_HEIGHT, DEPTH_WIDTH,
    FRAME_BYTES_PER_PIXEL, RGB_HEIGHT, RGB_WIDTH,
};

/// Opaque device handle used across the driver boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub usize);

/// One decoded image as delivered by the driver.
///
/// `data` is `None` when the driver delivered a null buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub bytes_per_pixel: usize,
    pub data: Option<Vec<u8>>,
}

impl Frame {
    /// Depth frame from row-major samples.
    pub fn depth(width: usize, height: usize, samples: &[f32]) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel: FRAME_BYTES_PER_PIXEL,
            data: Some(bytemuck::cast_slice::<f32, u8>(samples).to_vec()),
        }
    }

    /// Color frame from row-major BGRA bytes.
    pub fn color(width: usize, height: usize, bgra: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel: FRAME_BYTES_PER_PIXEL,
            data: Some(bgra),
        }
    }

    /// Frame with the sensor's depth geometry and no buffer.
    pub fn null_depth() -> Self {
        Self {
            width: DEPTH_WIDTH,
            height: DEPTH_HEIGHT,
            bytes_per_pixel: FRAME_BYTES_PER_PIXEL,
            data: None,
        }
    }

    /// Frame with the sensor's color geometry and no buffer.
    pub fn null_color() -> Self {
        Self {
            width: RGB_WIDTH,
            height: RGB_HEIGHT,
            bytes_per_pixel: FRAME_BYTES_PER_PIXEL,
            data: None,
        }
    }

    /// Borrowed view for the transcoder.
    pub fn as_source(&self) -> SourceFrame<'_> {
        SourceFrame {
            width: self.width,
            height: self.height,
            bytes_per_pixel: self.bytes_per_pixel,
            data: self.data.as_deref(),
        }
    }
}

/// Frames captured at one instant.
#[derive(Debug, Clone)]
pub struct FrameSet {
    pub sequence: u64,
    pub depth: Option<Frame>,
    pub color: Option<Frame>,
}

impl FrameSet {
    pub fn empty(sequence: u64) -> Self {
        Self {
            sequence,
            depth: None,
            color: None,
        }
    }
}

/// Abstraction over the sensor driver.
///
/// All methods take `&self`; implementations manage their own interior
/// mutability.
pub trait Freenect2Api: Send + Sync {
    /// Number of connected devices.
    fn enumerate_devices(&self) -> Result<usize>;

    /// Open the first device, decoding through `pipeline`.
    ///
    /// Fails with `PipelineCreationFailed` or `DeviceOpenFailed`.
    fn open_default_device(&self, pipeline: DepthProcessor) -> Result<DeviceHandle>;

    /// Serial and firmware of an opened device.
    fn device_info(&self, device: DeviceHandle) -> Result<DeviceInfo>;

    /// Attach a frame listener for the given streams.
    fn set_frame_listener(&self, device: DeviceHandle, types: FrameTypes) -> Result<()>;

    fn start(&self, device: DeviceHandle) -> Result<()>;

    fn stop(&self, device: DeviceHandle) -> Result<()>;

    fn close(&self, device: DeviceHandle) -> Result<()>;

    /// Block up to `timeout` for the next frame set.
    ///
    /// `Ok(None)` means nothing arrived in time. Every returned set must be
    /// handed back through [`release`](Self::release).
    fn wait_for_new_frame(&self, device: DeviceHandle, timeout: Duration)
        -> Result<Option<FrameSet>>;

    /// Return a frame set to the driver's buffer pool.
    fn release(&self, device: DeviceHandle, frames: FrameSet) -> Result<()>;

    /// Driver logger verbosity; `LogLevel::None` removes the logger.
    fn set_log_level(&self, level: LogLevel);
}

/// A frame set on loan from the driver, released when dropped.
pub struct FrameGuard<'a, S: Freenect2Api + ?Sized> {
    sdk: &'a S,
    device: DeviceHandle,
    frames: FrameSet,
}

impl<'a, S: Freenect2Api + ?Sized> FrameGuard<'a, S> {
    pub fn new(sdk: &'a S, device: DeviceHandle, frames: FrameSet) -> Self {
        Self {
            sdk,
            device,
            frames,
        }
    }

    pub fn frames(&self) -> &FrameSet {
        &self.frames
    }
}

impl<S: Freenect2Api + ?Sized> Drop for FrameGuard<'_, S> {
    fn drop(&mut self) {
        let sequence = self.frames.sequence;
        let frames = std::mem::replace(&mut self.frames, FrameSet::empty(sequence));
        if let Err(e) = self.sdk.release(self.device, frames) {
            tracing::warn!("failed to release frame set {sequence}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinect::mock::MockFreenect2;

    #[test]
    fn device_handle_equality() {
        assert_eq!(DeviceHandle(0), DeviceHandle(0));
        assert_ne!(DeviceHandle(0), DeviceHandle(1));
        assert_eq!(format!("{:?}", DeviceHandle(7)), "DeviceHandle(7)");
    }

    #[test]
    fn depth_frame_stores_native_bytes() {
        let frame = Frame::depth(2, 1, &[1.5, -2.0]);
        let data = frame.data.as_deref().unwrap();
        assert_eq!(data.len(), 8);
        assert_eq!(&data[..4], &1.5f32.to_ne_bytes());
    }

    #[test]
    fn null_frames_have_no_buffer() {
        assert!(Frame::null_depth().as_source().data.is_none());
        let color = Frame::null_color();
        assert_eq!((color.width, color.height), (RGB_WIDTH, RGB_HEIGHT));
    }

    #[test]
    fn guard_releases_exactly_once_on_drop() {
        let mock = MockFreenect2::new();
        let set = FrameSet::empty(1);
        {
            let guard = FrameGuard::new(&mock, DeviceHandle(0), set);
            assert_eq!(guard.frames().sequence, 1);
            assert_eq!(mock.frames_released(), 0);
        }
        assert_eq!(mock.frames_released(), 1);
    }

    #[test]
    fn trait_is_object_safe() {
        fn _accepts_dyn(_sdk: &dyn Freenect2Api) {}
    }

    #[test]
    fn trait_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Box<dyn Freenect2Api>>();
    }
}

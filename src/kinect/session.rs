//! Device session: open/close state machine and per-tick capture.
//!
//! One session per host object. `grab` waits for the next frame set in
//! short slices so a `close` from another thread can cancel it, copies the
//! enabled streams into the outlet matrices and hands the set back to the
//! driver on every path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jit_matrix::{copy_color, copy_depth, Matrix, TranscodeError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::kinect::api::{DeviceHandle, FrameGuard, FrameSet, Freenect2Api};
use crate::kinect::config::Config;
use crate::kinect::error::{KinectError, Result};
use crate::kinect::stats::{CaptureStats, StatsSnapshot};
use crate::kinect::types::{DeviceInfo, FrameTypes, SessionState, Transition};

/// Longest single blocking call into the driver while waiting for frames.
const WAIT_SLICE: Duration = Duration::from_millis(100);

#[derive(Default)]
struct SessionInner {
    state: SessionState,
    device: Option<DeviceHandle>,
    info: Option<DeviceInfo>,
}

/// Capture session over a `Freenect2Api` driver.
pub struct Session<S: Freenect2Api + ?Sized> {
    sdk: Arc<S>,
    inner: Mutex<SessionInner>,
    /// Held for the whole of a `grab`; `close` takes it before tearing down.
    capture: Mutex<()>,
    cancel: AtomicBool,
    stats: Mutex<CaptureStats>,
}

impl<S: Freenect2Api + ?Sized> Session<S> {
    pub fn new(sdk: Arc<S>) -> Self {
        Self {
            sdk,
            inner: Mutex::new(SessionInner::default()),
            capture: Mutex::new(()),
            cancel: AtomicBool::new(false),
            stats: Mutex::new(CaptureStats::new()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Serial and firmware of the open device.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.inner.lock().info.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.lock().snapshot()
    }

    /// Open the default device with the configured pipeline.
    ///
    /// Opening an open or opening session does nothing. The state lock is
    /// not held across driver calls, so `state()` reports `Opening` while
    /// the device comes up. On failure the session is back in `Closed` and
    /// nothing is retried; reporting the error is left to the caller.
    pub fn open(&self, config: &Config) -> Result<Transition> {
        {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Closed {
                debug!("device already {}", inner.state.as_str());
                return Ok(Transition::Unchanged);
            }
            inner.state = SessionState::Opening;
            self.cancel.store(false, Ordering::SeqCst);
        }

        let opened = self.open_device(config);
        let mut inner = self.inner.lock();
        match opened {
            Ok((device, _)) if self.cancel.load(Ordering::SeqCst) => {
                // close() ran while the device was coming up
                inner.state = SessionState::Closed;
                let stopped = self.sdk.stop(device);
                if let Err(e) = stopped.and(self.sdk.close(device)) {
                    debug!("close after cancelled open: {e}");
                }
                Err(KinectError::Cancelled)
            }
            Ok((device, device_info)) => {
                info!(
                    "opened device {} (firmware {}) with {} pipeline",
                    device_info.serial, device_info.firmware, config.depth_processor
                );
                inner.state = SessionState::Open;
                inner.device = Some(device);
                inner.info = Some(device_info);
                self.stats.lock().reset();
                Ok(Transition::Changed)
            }
            Err(e) => {
                debug!("open failed: {e}");
                inner.state = SessionState::Closed;
                Err(e)
            }
        }
    }

    fn open_device(&self, config: &Config) -> Result<(DeviceHandle, DeviceInfo)> {
        let count = self.sdk.enumerate_devices()?;
        if count == 0 {
            return Err(KinectError::NoDeviceConnected);
        }
        debug!("{count} device(s) connected");

        let device = self.sdk.open_default_device(config.depth_processor)?;

        let started = self
            .sdk
            .set_frame_listener(device, FrameTypes::COLOR_AND_DEPTH)
            .and_then(|()| self.sdk.start(device));
        if let Err(e) = started {
            if let Err(close_err) = self.sdk.close(device) {
                debug!("close after failed start: {close_err}");
            }
            return Err(KinectError::DeviceOpenFailed(e.to_string()));
        }

        let device_info = self.sdk.device_info(device).unwrap_or_else(|e| {
            debug!("device info unavailable: {e}");
            DeviceInfo::default()
        });
        Ok((device, device_info))
    }

    /// Stop and close the device, cancelling a grab blocked on frames or an
    /// open still in progress.
    pub fn close(&self) -> Result<Transition> {
        self.cancel.store(true, Ordering::SeqCst);
        let _capture = self.capture.lock();

        let mut inner = self.inner.lock();
        let Some(device) = inner.device.take() else {
            return Ok(Transition::Unchanged);
        };
        inner.state = SessionState::Closed;
        inner.info = None;

        let stopped = self.sdk.stop(device);
        let closed = self.sdk.close(device);
        info!("device closed");
        stopped.and(closed)?;
        Ok(Transition::Changed)
    }

    /// One host tick: wait for a frame set and copy it into the outlets.
    ///
    /// `color` is only written when `config.rgb_frames` is set. The frame set
    /// is released before returning, whatever the outcome.
    pub fn grab(&self, config: &Config, depth: &Matrix, color: Option<&Matrix>) -> Result<()> {
        let _capture = self.capture.lock();
        let device = {
            let inner = self.inner.lock();
            match (inner.state, inner.device) {
                (SessionState::Open, Some(device)) => device,
                _ => return Err(KinectError::NotOpen),
            }
        };

        let frames = match self.wait_for_frames(device, config.frame_timeout()) {
            Ok(frames) => frames,
            Err(e) => {
                if matches!(e, KinectError::FrameTimeout(_)) {
                    self.stats.lock().record_timeout();
                }
                return Err(e);
            }
        };

        let color = color.filter(|_| config.rgb_frames);
        match transcode(frames.frames(), depth, color) {
            Ok(bytes) => {
                self.stats.lock().record_frame(bytes);
                Ok(())
            }
            Err(e) => {
                self.stats.lock().record_error();
                Err(e)
            }
        }
    }

    fn wait_for_frames(&self, device: DeviceHandle, timeout: Duration) -> Result<FrameGuard<'_, S>> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Err(KinectError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(KinectError::FrameTimeout(timeout));
            }
            let slice = (deadline - now).min(WAIT_SLICE);
            if let Some(frames) = self.sdk.wait_for_new_frame(device, slice)? {
                return Ok(FrameGuard::new(&*self.sdk, device, frames));
            }
        }
    }
}

impl<S: Freenect2Api + ?Sized> Drop for Session<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("close on drop failed: {e}");
        }
    }
}

/// Copy the frames of one set into the outlet matrices, returning the
/// number of source bytes consumed.
fn transcode(frames: &FrameSet, depth: &Matrix, color: Option<&Matrix>) -> Result<usize> {
    let depth_frame = frames.depth.as_ref().ok_or_else(|| {
        TranscodeError::InvalidSource(format!("frame set {} has no depth frame", frames.sequence))
    })?;
    let source = depth_frame.as_source();
    copy_depth(&source, &mut *depth.lock())?;
    let mut bytes = source.data.map_or(0, <[u8]>::len);

    if let Some(color) = color {
        let color_frame = frames.color.as_ref().ok_or_else(|| {
            TranscodeError::InvalidSource(format!(
                "frame set {} has no color frame",
                frames.sequence
            ))
        })?;
        let source = color_frame.as_source();
        copy_color(&source, &mut *color.lock())?;
        bytes += source.data.map_or(0, <[u8]>::len);
    }
    Ok(bytes)
}

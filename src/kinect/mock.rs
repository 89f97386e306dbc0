//! Mock driver for testing without a sensor.
//!
//! Uses a builder pattern to configure devices, queued frame sets and
//! error injection. Counters expose how the session drove the driver.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;

use crate::kinect::api::{DeviceHandle, Frame, FrameSet, Freenect2Api};
use crate::kinect::error::{KinectError, Result};
use crate::kinect::types::{
    DepthProcessor, DeviceInfo, FrameTypes, LogLevel, DEPTH_HEIGHT, DEPTH_WIDTH, RGB_HEIGHT,
    RGB_WIDTH,
};

/// Configurable error injection for a specific operation.
#[derive(Debug)]
struct ErrorInjection {
    operation: &'static str,
    error: KinectError,
}

/// Mock driver implementation.
///
/// All state is behind a `Mutex` so the mock satisfies `Send + Sync`.
pub struct MockFreenect2 {
    state: Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<DeviceInfo>,
    queued: VecDeque<FrameSet>,
    repeating: Option<FrameSet>,
    open_delay: Duration,
    error_injections: Vec<ErrorInjection>,
    open_device: Option<DeviceHandle>,
    pipeline: Option<DepthProcessor>,
    listener: Option<FrameTypes>,
    streaming: bool,
    log_level: Option<LogLevel>,
    frames_acquired: u32,
    frames_released: u32,
    open_calls: u32,
    close_calls: u32,
}

impl MockFreenect2 {
    /// Create a new empty mock (no devices).
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Add a device with the given serial number.
    pub fn with_device(self, serial: &str) -> Self {
        self.state.lock().devices.push(DeviceInfo {
            serial: serial.to_string(),
            firmware: "2.3.3913.0.7".to_string(),
        });
        self
    }

    /// Queue a frame set; queued sets are delivered once, in order.
    pub fn with_frame_set(self, frames: FrameSet) -> Self {
        self.state.lock().queued.push_back(frames);
        self
    }

    /// Deliver a copy of `frames` on every wait once the queue is empty.
    pub fn with_repeating_frames(self, frames: FrameSet) -> Self {
        self.state.lock().repeating = Some(frames);
        self
    }

    /// Make `open_default_device` block for `delay`, like a slow USB bring-up.
    pub fn with_open_delay(self, delay: Duration) -> Self {
        self.state.lock().open_delay = delay;
        self
    }

    /// Inject an error for a specific operation name.
    ///
    /// Operation names: `"enumerate_devices"`, `"open_default_device"`,
    /// `"device_info"`, `"set_frame_listener"`, `"start"`, `"stop"`,
    /// `"close"`, `"wait_for_new_frame"`, `"release"`.
    pub fn with_error(self, operation: &'static str, error: KinectError) -> Self {
        self.state
            .lock()
            .error_injections
            .push(ErrorInjection { operation, error });
        self
    }

    pub fn frames_acquired(&self) -> u32 {
        self.state.lock().frames_acquired
    }

    pub fn frames_released(&self) -> u32 {
        self.state.lock().frames_released
    }

    pub fn open_calls(&self) -> u32 {
        self.state.lock().open_calls
    }

    pub fn close_calls(&self) -> u32 {
        self.state.lock().close_calls
    }

    pub fn is_streaming(&self) -> bool {
        self.state.lock().streaming
    }

    /// Pipeline requested by the last successful open.
    pub fn pipeline(&self) -> Option<DepthProcessor> {
        self.state.lock().pipeline
    }

    pub fn listener(&self) -> Option<FrameTypes> {
        self.state.lock().listener
    }

    pub fn log_level(&self) -> Option<LogLevel> {
        self.state.lock().log_level
    }
}

impl Default for MockFreenect2 {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    /// Check for injected errors for the given operation.
    fn check_error(&mut self, operation: &str) -> Result<()> {
        if let Some(pos) = self
            .error_injections
            .iter()
            .position(|e| e.operation == operation)
        {
            let injection = self.error_injections.remove(pos);
            return Err(injection.error);
        }
        Ok(())
    }

    fn check_open(&self, device: DeviceHandle) -> Result<()> {
        match self.open_device {
            Some(open) if open == device => Ok(()),
            _ => Err(KinectError::Driver(format!("device {} is not open", device.0))),
        }
    }

    fn next_frames(&mut self) -> Option<FrameSet> {
        self.queued
            .pop_front()
            .or_else(|| self.repeating.clone())
    }
}

impl Freenect2Api for MockFreenect2 {
    fn enumerate_devices(&self) -> Result<usize> {
        let mut state = self.state.lock();
        state.check_error("enumerate_devices")?;
        Ok(state.devices.len())
    }

    fn open_default_device(&self, pipeline: DepthProcessor) -> Result<DeviceHandle> {
        let delay = self.state.lock().open_delay;
        std::thread::sleep(delay);
        let mut state = self.state.lock();
        state.open_calls += 1;
        state.check_error("open_default_device")?;
        if state.devices.is_empty() {
            return Err(KinectError::DeviceOpenFailed("no device".to_string()));
        }
        if state.open_device.is_some() {
            return Err(KinectError::DeviceOpenFailed(
                "device already open".to_string(),
            ));
        }
        let handle = DeviceHandle(0);
        state.open_device = Some(handle);
        state.pipeline = Some(pipeline);
        Ok(handle)
    }

    fn device_info(&self, device: DeviceHandle) -> Result<DeviceInfo> {
        let mut state = self.state.lock();
        state.check_error("device_info")?;
        state.check_open(device)?;
        state
            .devices
            .get(device.0)
            .cloned()
            .ok_or_else(|| KinectError::Driver(format!("mock device {}", device.0)))
    }

    fn set_frame_listener(&self, device: DeviceHandle, types: FrameTypes) -> Result<()> {
        let mut state = self.state.lock();
        state.check_error("set_frame_listener")?;
        state.check_open(device)?;
        state.listener = Some(types);
        Ok(())
    }

    fn start(&self, device: DeviceHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.check_error("start")?;
        state.check_open(device)?;
        state.streaming = true;
        Ok(())
    }

    fn stop(&self, device: DeviceHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.check_error("stop")?;
        state.check_open(device)?;
        state.streaming = false;
        Ok(())
    }

    fn close(&self, device: DeviceHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.close_calls += 1;
        state.check_error("close")?;
        state.check_open(device)?;
        state.streaming = false;
        state.listener = None;
        state.open_device = None;
        Ok(())
    }

    fn wait_for_new_frame(
        &self,
        device: DeviceHandle,
        timeout: Duration,
    ) -> Result<Option<FrameSet>> {
        {
            let mut state = self.state.lock();
            state.check_error("wait_for_new_frame")?;
            state.check_open(device)?;
            if !state.streaming {
                return Err(KinectError::Driver("stream not started".to_string()));
            }
            if let Some(frames) = state.next_frames() {
                state.frames_acquired += 1;
                return Ok(Some(frames));
            }
        }
        // Nothing to deliver: behave like a stalled sensor.
        std::thread::sleep(timeout);
        Ok(None)
    }

    fn release(&self, _device: DeviceHandle, _frames: FrameSet) -> Result<()> {
        let mut state = self.state.lock();
        state.frames_released += 1;
        state.check_error("release")
    }

    fn set_log_level(&self, level: LogLevel) {
        self.state.lock().log_level = Some(level);
    }
}

/// Full-resolution frame set: depth sample `i` is `i as f32`, color pixel
/// `i` is BGRA `[i, i + 1, i + 2, 0xFF]` (wrapping).
pub fn full_frame_set(sequence: u64) -> FrameSet {
    let samples: Vec<f32> = (0..DEPTH_WIDTH * DEPTH_HEIGHT).map(|i| i as f32).collect();
    let bgra: Vec<u8> = (0..RGB_WIDTH * RGB_HEIGHT)
        .flat_map(|i| {
            let b = i as u8;
            [b, b.wrapping_add(1), b.wrapping_add(2), 0xFF]
        })
        .collect();
    FrameSet {
        sequence,
        depth: Some(Frame::depth(DEPTH_WIDTH, DEPTH_HEIGHT, &samples)),
        color: Some(Frame::color(RGB_WIDTH, RGB_HEIGHT, bgra)),
    }
}

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::kinect::api::{DeviceHandle, Frame, FrameSet, Freenect2Api};
use crate::kinect::error::{KinectError, Result};
use crate::kinect::types::{
    DepthProcessor, DeviceInfo, FrameTypes, LogLevel, DEPTH_HEIGHT, DEPTH_WIDTH, RGB_HEIGHT,
    RGB_WIDTH,
};

const DUMMY_SERIAL: &str = "dummy-kinect-000000";
const DUMMY_FIRMWARE: &str = "0.0.0.0";

/// Interval between synthetic frame sets (30 fps, like the sensor).
const FRAME_INTERVAL: Duration = Duration::from_micros(33_333);

/// Nearest and farthest synthetic depth, in millimetres.
const DEPTH_NEAR: f32 = 500.0;
const DEPTH_FAR: f32 = 4500.0;

/// BGRA color bars, left to right.
const BARS: [[u8; 4]; 8] = [
    [0xFF, 0xFF, 0xFF, 0xFF],
    [0x00, 0xFF, 0xFF, 0xFF],
    [0xFF, 0xFF, 0x00, 0xFF],
    [0x00, 0xFF, 0x00, 0xFF],
    [0xFF, 0x00, 0xFF, 0xFF],
    [0x00, 0x00, 0xFF, 0xFF],
    [0xFF, 0x00, 0x00, 0xFF],
    [0x00, 0x00, 0x00, 0xFF],
];

/// A fake sensor for running a patch without hardware.
///
/// Reports one device and delivers a depth ramp that scrolls one column per
/// frame plus static color bars. Enable via `DUMMY_KINECT=1`.
pub struct DummyDriver {
    state: Mutex<DummyState>,
}

#[derive(Default)]
struct DummyState {
    open: bool,
    streaming: bool,
    sequence: u64,
    last_frame: Option<Instant>,
}

impl DummyDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DummyState::default()),
        }
    }

    /// Whether the dummy sensor is enabled via environment variable.
    pub fn is_enabled() -> bool {
        std::env::var("DUMMY_KINECT").is_ok_and(|v| v == "1" || v == "true")
    }

    fn check_open(state: &DummyState, device: DeviceHandle) -> Result<()> {
        if state.open && device == DeviceHandle(0) {
            Ok(())
        } else {
            Err(KinectError::Driver(format!("device {} is not open", device.0)))
        }
    }
}

impl Default for DummyDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth ramp from near to far across the image, shifted by `sequence`.
pub fn depth_ramp(sequence: u64) -> Frame {
    let shift = (sequence % DEPTH_WIDTH as u64) as usize;
    let span = DEPTH_FAR - DEPTH_NEAR;
    let samples: Vec<f32> = (0..DEPTH_HEIGHT)
        .flat_map(|_| {
            (0..DEPTH_WIDTH).map(move |x| {
                let column = (x + shift) % DEPTH_WIDTH;
                DEPTH_NEAR + span * column as f32 / (DEPTH_WIDTH - 1) as f32
            })
        })
        .collect();
    Frame::depth(DEPTH_WIDTH, DEPTH_HEIGHT, &samples)
}

/// Eight vertical BGRA color bars at full color resolution.
pub fn color_bars() -> Frame {
    let bar_width = RGB_WIDTH / BARS.len();
    let row: Vec<u8> = (0..RGB_WIDTH)
        .flat_map(|x| BARS[(x / bar_width).min(BARS.len() - 1)])
        .collect();
    Frame::color(RGB_WIDTH, RGB_HEIGHT, row.repeat(RGB_HEIGHT))
}

impl Freenect2Api for DummyDriver {
    fn enumerate_devices(&self) -> Result<usize> {
        Ok(1)
    }

    fn open_default_device(&self, pipeline: DepthProcessor) -> Result<DeviceHandle> {
        let mut state = self.state.lock();
        if state.open {
            return Err(KinectError::DeviceOpenFailed(
                "device already open".to_string(),
            ));
        }
        tracing::debug!("dummy sensor opened with {pipeline} pipeline");
        state.open = true;
        state.sequence = 0;
        Ok(DeviceHandle(0))
    }

    fn device_info(&self, device: DeviceHandle) -> Result<DeviceInfo> {
        Self::check_open(&self.state.lock(), device)?;
        Ok(DeviceInfo {
            serial: DUMMY_SERIAL.to_string(),
            firmware: DUMMY_FIRMWARE.to_string(),
        })
    }

    fn set_frame_listener(&self, device: DeviceHandle, _types: FrameTypes) -> Result<()> {
        Self::check_open(&self.state.lock(), device)
    }

    fn start(&self, device: DeviceHandle) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_open(&state, device)?;
        state.streaming = true;
        Ok(())
    }

    fn stop(&self, device: DeviceHandle) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_open(&state, device)?;
        state.streaming = false;
        Ok(())
    }

    fn close(&self, device: DeviceHandle) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_open(&state, device)?;
        state.open = false;
        state.streaming = false;
        state.last_frame = None;
        Ok(())
    }

    fn wait_for_new_frame(
        &self,
        device: DeviceHandle,
        timeout: Duration,
    ) -> Result<Option<FrameSet>> {
        let wait = {
            let state = self.state.lock();
            Self::check_open(&state, device)?;
            if !state.streaming {
                return Err(KinectError::Driver("stream not started".to_string()));
            }
            state
                .last_frame
                .map_or(Duration::ZERO, |t| FRAME_INTERVAL.saturating_sub(t.elapsed()))
        };
        if wait > timeout {
            std::thread::sleep(timeout);
            return Ok(None);
        }
        std::thread::sleep(wait);

        let sequence = {
            let mut state = self.state.lock();
            state.last_frame = Some(Instant::now());
            state.sequence += 1;
            state.sequence
        };
        Ok(Some(FrameSet {
            sequence,
            depth: Some(depth_ramp(sequence)),
            color: Some(color_bars()),
        }))
    }

    fn release(&self, _device: DeviceHandle, _frames: FrameSet) -> Result<()> {
        Ok(())
    }

    fn set_log_level(&self, level: LogLevel) {
        tracing::debug!("dummy sensor log level {}", level.as_str());
    }
}

/// Driver used when no sensor backend is available: never finds a device.
#[derive(Debug, Default)]
pub struct NullDriver;

impl Freenect2Api for NullDriver {
    fn enumerate_devices(&self) -> Result<usize> {
        Ok(0)
    }

    fn open_default_device(&self, _pipeline: DepthProcessor) -> Result<DeviceHandle> {
        Err(KinectError::NoDeviceConnected)
    }

    fn device_info(&self, _device: DeviceHandle) -> Result<DeviceInfo> {
        Err(KinectError::NotOpen)
    }

    fn set_frame_listener(&self, _device: DeviceHandle, _types: FrameTypes) -> Result<()> {
        Err(KinectError::NotOpen)
    }

    fn start(&self, _device: DeviceHandle) -> Result<()> {
        Err(KinectError::NotOpen)
    }

    fn stop(&self, _device: DeviceHandle) -> Result<()> {
        Err(KinectError::NotOpen)
    }

    fn close(&self, _device: DeviceHandle) -> Result<()> {
        Err(KinectError::NotOpen)
    }

    fn wait_for_new_frame(
        &self,
        _device: DeviceHandle,
        _timeout: Duration,
    ) -> Result<Option<FrameSet>> {
        Err(KinectError::NotOpen)
    }

    fn release(&self, _device: DeviceHandle, _frames: FrameSet) -> Result<()> {
        Ok(())
    }

    fn set_log_level(&self, _level: LogLevel) {}
}

use serde::Serialize;
use std::time::Instant;

/// Counters for one capture session.
pub struct CaptureStats {
    frame_count: u64,
    timeout_count: u64,
    error_count: u64,
    total_bytes: u64,
    start_time: Instant,
    last_frame_time: Option<Instant>,
}

/// Snapshot of capture stats for the dumpout outlet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub fps: f64,
    pub frame_count: u64,
    pub timeout_count: u64,
    pub error_count: u64,
    pub bandwidth_bps: u64,
    pub ms_since_last_frame: Option<u64>,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self {
            frame_count: 0,
            timeout_count: 0,
            error_count: 0,
            total_bytes: 0,
            start_time: Instant::now(),
            last_frame_time: None,
        }
    }

    /// Record a frame set copied into the outlets.
    pub fn record_frame(&mut self, bytes: usize) {
        self.frame_count += 1;
        self.total_bytes += bytes as u64;
        self.last_frame_time = Some(Instant::now());
    }

    /// Record a tick that saw no frame in time.
    pub fn record_timeout(&mut self) {
        self.timeout_count += 1;
    }

    /// Record a frame set that could not be transcoded.
    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    /// Frames per second since the session opened.
    pub fn fps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.frame_count as f64 / elapsed
    }

    /// Bytes copied per second.
    pub fn bandwidth_bps(&self) -> u64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0;
        }
        (self.total_bytes as f64 / elapsed) as u64
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fps: self.fps(),
            frame_count: self.frame_count,
            timeout_count: self.timeout_count,
            error_count: self.error_count,
            bandwidth_bps: self.bandwidth_bps(),
            ms_since_last_frame: self
                .last_frame_time
                .map(|t| t.elapsed().as_millis() as u64),
        }
    }
}

impl Default for CaptureStats {
    fn default() -> Self {
        Self::new()
    }
}

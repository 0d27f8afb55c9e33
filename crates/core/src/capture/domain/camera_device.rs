use std::time::Duration;

use crate::capture::domain::capture_error::CaptureError;
use crate::shared::constants::{
    DEFAULT_CAPTURE_FPS, DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_INTERVAL, DEFAULT_CAPTURE_WIDTH,
};
use crate::shared::frame::Frame;

/// Requested capture format. Devices may deliver a different size if the
/// hardware cannot honour it; frames always carry their real dimensions.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureConfig {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Delay between reads in the capture loop.
    pub interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "0".to_string(),
            width: DEFAULT_CAPTURE_WIDTH,
            height: DEFAULT_CAPTURE_HEIGHT,
            fps: DEFAULT_CAPTURE_FPS,
            interval: DEFAULT_CAPTURE_INTERVAL,
        }
    }
}

impl CaptureConfig {
    /// Interval matching a target frame rate; zero fps falls back to the default.
    pub fn interval_for_fps(fps: u32) -> Duration {
        if fps == 0 {
            DEFAULT_CAPTURE_INTERVAL
        } else {
            Duration::from_millis(1000 / fps as u64)
        }
    }
}

/// Owns a camera handle. Only the frame source touches it.
///
/// `read` returning `Ok(None)` means the device produced nothing this time
/// (an empty read); the capture loop logs it and carries on.
pub trait CameraDevice: Send {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CaptureError>;

    fn read(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Releases the device handle. Safe to call when not open.
    fn release(&mut self);
}

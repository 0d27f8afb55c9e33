use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera device {device:?} is unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },
    #[error("camera read failed: {0}")]
    Read(String),
    #[error("camera device is not open")]
    NotOpen,
}

use crate::capture::domain::camera_device::CameraDevice;
use crate::capture::domain::capture_error::CaptureError;

use super::synthetic_camera::{SyntheticCamera, SYNTHETIC_DEVICE};

/// Picks a camera backend for a device name.
///
/// `"synthetic"` always works. Anything else needs the `ffmpeg` feature.
pub fn create_camera(device: &str) -> Result<Box<dyn CameraDevice>, CaptureError> {
    if device == SYNTHETIC_DEVICE {
        log::info!("Using synthetic test-pattern camera");
        return Ok(Box::new(SyntheticCamera::new()));
    }
    hardware_camera(device)
}

#[cfg(feature = "ffmpeg")]
fn hardware_camera(device: &str) -> Result<Box<dyn CameraDevice>, CaptureError> {
    log::info!("Using ffmpeg camera backend for device {device:?}");
    Ok(Box::new(super::ffmpeg_camera::FfmpegCamera::new()))
}

#[cfg(not(feature = "ffmpeg"))]
fn hardware_camera(device: &str) -> Result<Box<dyn CameraDevice>, CaptureError> {
    Err(CaptureError::DeviceUnavailable {
        device: device.to_string(),
        reason: "built without the `ffmpeg` feature; only \"synthetic\" is available".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::camera_device::CaptureConfig;

    #[test]
    fn test_synthetic_device_is_always_available() {
        let mut camera = create_camera(SYNTHETIC_DEVICE).unwrap();
        let config = CaptureConfig {
            device: SYNTHETIC_DEVICE.to_string(),
            width: 16,
            height: 8,
            ..CaptureConfig::default()
        };
        camera.open(&config).unwrap();
        assert!(camera.read().unwrap().is_some());
    }

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn test_hardware_device_needs_ffmpeg_feature() {
        assert!(matches!(
            create_camera("0"),
            Err(CaptureError::DeviceUnavailable { .. })
        ));
    }
}

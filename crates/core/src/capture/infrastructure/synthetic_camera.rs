use crate::capture::domain::camera_device::{CameraDevice, CaptureConfig};
use crate::capture::domain::capture_error::CaptureError;
use crate::shared::frame::{Frame, CHANNELS};

/// Device name that selects the synthetic camera.
pub const SYNTHETIC_DEVICE: &str = "synthetic";

/// Hardware-free camera producing a deterministic test pattern.
///
/// A diagonal BGR gradient with a light square sliding left to right, one
/// step per frame. Frame `n` is always byte-identical for a given size.
pub struct SyntheticCamera {
    size: Option<(u32, u32)>,
    next_index: u64,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self {
            size: None,
            next_index: 0,
        }
    }

    pub fn render(width: u32, height: u32, index: u64) -> Frame {
        let w = width as usize;
        let h = height as usize;
        let ch = CHANNELS as usize;
        let mut data = vec![0u8; w * h * ch];

        let side = (w.min(h) / 3).max(1);
        let travel = w.saturating_sub(side).max(1);
        let left = (index as usize * 4) % travel;
        let top = (h - side.min(h)) / 2;

        for y in 0..h {
            for x in 0..w {
                let offset = (y * w + x) * ch;
                let inside = x >= left && x < left + side && y >= top && y < top + side;
                if inside {
                    data[offset..offset + ch].copy_from_slice(&[180, 200, 230]);
                } else {
                    data[offset] = (x * 255 / w.max(1)) as u8;
                    data[offset + 1] = (y * 255 / h.max(1)) as u8;
                    data[offset + 2] = ((x + y) * 127 / (w + h).max(1)) as u8;
                }
            }
        }

        Frame::new(data, width, height, index)
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraDevice for SyntheticCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CaptureError> {
        if config.width == 0 || config.height == 0 {
            return Err(CaptureError::DeviceUnavailable {
                device: config.device.clone(),
                reason: format!("invalid size {}x{}", config.width, config.height),
            });
        }
        self.size = Some((config.width, config.height));
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        let (width, height) = self.size.ok_or(CaptureError::NotOpen)?;
        let frame = Self::render(width, height, self.next_index);
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.size = None;
    }
}

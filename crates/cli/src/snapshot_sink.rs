use std::path::{Path, PathBuf};

use rudolph_core::detection::domain::detection_result::DetectionResult;
use rudolph_core::pipeline::domain::frame_sink::{FrameSink, SinkError};
use rudolph_core::shared::frame::Frame;

/// Writes every `every`-th presented frame to `<dir>/frame_<index>.png`.
pub struct SnapshotSink {
    dir: PathBuf,
    every: u64,
    seen: u64,
    written: u64,
}

impl SnapshotSink {
    pub fn new(dir: &Path, every: u64) -> Result<Self, SinkError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            every: every.max(1),
            seen: 0,
            written: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn path_for(&self, frame: &Frame) -> PathBuf {
        self.dir.join(format!("frame_{:08}.png", frame.index()))
    }
}

impl FrameSink for SnapshotSink {
    fn present(&mut self, frame: &Frame, detection: &DetectionResult) -> Result<(), SinkError> {
        self.seen += 1;
        if self.seen % self.every != 0 {
            return Ok(());
        }

        let img = image::RgbImage::from_raw(frame.width(), frame.height(), bgr_to_rgb(frame.data()))
            .ok_or("frame buffer does not match its dimensions")?;
        let path = self.path_for(frame);
        img.save(&path)?;
        self.written += 1;

        log::info!(
            "Saved {} (face: {}, engine: {})",
            path.display(),
            detection.is_detected(),
            detection.engine_name()
        );
        Ok(())
    }
}

fn bgr_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len());
    for px in data.chunks_exact(3) {
        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;
    use rudolph_core::detection::domain::engine_kind::EngineKind;
    use tempfile::TempDir;

    fn bgr_frame(index: u64) -> Frame {
        let mut data = Vec::new();
        for _ in 0..(4 * 3) {
            data.extend_from_slice(&[10, 20, 200]);
        }
        Frame::new(data, 4, 3, index)
    }

    #[test]
    fn test_bgr_to_rgb_swaps_channels() {
        assert_eq!(bgr_to_rgb(&[1, 2, 3, 4, 5, 6]), vec![3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_writes_every_nth_frame() {
        let dir = TempDir::new().unwrap();
        let mut sink = SnapshotSink::new(dir.path(), 2).unwrap();
        let detection = DetectionResult::not_detected(EngineKind::MediaPipe);
        for i in 0..5 {
            sink.present(&bgr_frame(i), &detection).unwrap();
        }

        assert_eq!(sink.written(), 2);
        assert!(dir.path().join("frame_00000001.png").exists());
        assert!(dir.path().join("frame_00000003.png").exists());
        assert!(!dir.path().join("frame_00000000.png").exists());
    }

    #[test]
    fn test_png_is_rgb() {
        let dir = TempDir::new().unwrap();
        let mut sink = SnapshotSink::new(dir.path(), 1).unwrap();
        let frame = bgr_frame(0);
        sink.present(&frame, &DetectionResult::not_detected(EngineKind::Dlib))
            .unwrap();

        let img = image::open(sink.path_for(&frame)).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (4, 3));
        assert_eq!(img.get_pixel(0, 0).0, [200, 20, 10]);
    }

    #[test]
    fn test_creates_output_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        SnapshotSink::new(&nested, 1).unwrap();
        assert!(nested.is_dir());
    }
}

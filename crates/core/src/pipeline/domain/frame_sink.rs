use crate::detection::domain::detection_result::DetectionResult;
use crate::shared::frame::Frame;

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// A frame after the effect stage, with the detection it was drawn from.
#[derive(Clone, Debug)]
pub struct ProcessedFrame {
    pub frame: Frame,
    pub detection: DetectionResult,
}

/// Display-side collaborator that receives every processed frame.
///
/// Called on the pipeline worker thread; a slow sink lowers the effective
/// frame rate but never builds a backlog upstream.
pub trait FrameSink: Send {
    fn present(&mut self, frame: &Frame, detection: &DetectionResult) -> Result<(), SinkError>;
}

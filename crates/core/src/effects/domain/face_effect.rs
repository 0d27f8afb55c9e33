use crate::detection::domain::detection_result::DetectionResult;
use crate::shared::frame::Frame;

pub type EffectError = Box<dyn std::error::Error + Send + Sync>;

/// Domain interface for landmark-driven overlays.
///
/// `apply` returns a modified copy and never writes to `frame`: the pipeline
/// falls back to the original when a later stage fails. Implementations hold
/// no per-call state, so the same inputs always give byte-identical output.
/// A result without landmarks yields an unmodified copy.
pub trait FaceEffect: Send {
    fn apply(&self, frame: &Frame, result: &DetectionResult) -> Result<Frame, EffectError>;

    fn name(&self) -> &'static str;
}

use crate::shared::frame::Frame;

pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// Observer attached to a frame source. Every subscriber receives every
/// frame, synchronously on the capture thread.
///
/// Implementations must return quickly: the capture loop does not read the
/// next frame until all subscribers have returned. Slow work belongs on
/// another thread (see `LatestFrameSlot`). Errors and panics are contained
/// by the source.
pub trait FrameSubscriber: Send + Sync {
    fn on_frame(&self, frame: &Frame) -> Result<(), SubscriberError>;
}

impl<F> FrameSubscriber for F
where
    F: Fn(&Frame) -> Result<(), SubscriberError> + Send + Sync,
{
    fn on_frame(&self, frame: &Frame) -> Result<(), SubscriberError> {
        self(frame)
    }
}

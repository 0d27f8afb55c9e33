use crate::detection::domain::bridge_error::BridgeError;
use crate::detection::domain::detection_result::DetectionResult;
use crate::detection::domain::engine_kind::EngineKind;
use crate::shared::frame::Frame;

/// Lifecycle states of the link to the detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Lifecycle states of the detector process itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Starting,
    Ready,
    Stopping,
    Stopped,
}

/// Port to an out-of-process face detector.
///
/// `detect` is single-flight: implementations serialise concurrent callers,
/// because replies are matched to requests purely by order. It degrades to
/// [`DetectionResult::not_detected`] for every failure except a broken link,
/// which surfaces as [`BridgeError::ConnectionLost`].
pub trait DetectionService: Send + Sync {
    fn start(&self) -> Result<(), BridgeError>;

    fn stop(&self);

    fn detect(&self, frame: &Frame) -> Result<DetectionResult, BridgeError>;

    fn engine(&self) -> EngineKind;

    /// Takes effect on the next request; a request already sent keeps its engine.
    fn set_engine(&self, engine: EngineKind);

    fn connection_state(&self) -> ConnectionState;
}

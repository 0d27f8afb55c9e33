use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The two interchangeable landmark backends inside the detector process.
///
/// `Dlib` is the primary engine (68-point shape predictor), `MediaPipe` the
/// secondary one (face mesh). Serialised lowercase, as the detector expects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Dlib,
    #[default]
    MediaPipe,
}

impl EngineKind {
    pub const ALL: &[EngineKind] = &[EngineKind::Dlib, EngineKind::MediaPipe];

    /// Wire name, e.g. `"mediapipe"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Dlib => "dlib",
            EngineKind::MediaPipe => "mediapipe",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            EngineKind::Dlib => 0,
            EngineKind::MediaPipe => 1,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => EngineKind::Dlib,
            _ => EngineKind::MediaPipe,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Dlib => write!(f, "Dlib"),
            EngineKind::MediaPipe => write!(f, "MediaPipe"),
        }
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dlib" | "primary" => Ok(EngineKind::Dlib),
            "mediapipe" | "secondary" => Ok(EngineKind::MediaPipe),
            other => Err(format!("unknown engine {other:?} (expected dlib or mediapipe)")),
        }
    }
}

/// Shared, last-writer-wins engine selection.
///
/// Cloning yields another handle to the same selection, so a UI thread can
/// switch engines while the pipeline thread reads it per request.
#[derive(Clone, Debug)]
pub struct EngineSelector {
    current: Arc<AtomicU8>,
}

impl EngineSelector {
    pub fn new(initial: EngineKind) -> Self {
        Self {
            current: Arc::new(AtomicU8::new(initial.to_u8())),
        }
    }

    pub fn get(&self) -> EngineKind {
        EngineKind::from_u8(self.current.load(Ordering::Acquire))
    }

    pub fn set(&self, engine: EngineKind) {
        self.current.store(engine.to_u8(), Ordering::Release);
    }
}

impl Default for EngineSelector {
    fn default() -> Self {
        Self::new(EngineKind::default())
    }
}

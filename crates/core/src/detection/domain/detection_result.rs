use crate::detection::domain::engine_kind::EngineKind;
use crate::shared::geometry::{BoundingBox, Point};

/// Facial geometry for one face, in the pixel space of the source frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Landmarks {
    pub nose_tip: Point,
    /// Ordered outline points; may be empty.
    pub contour: Vec<Point>,
    pub bounding_box: BoundingBox,
}

impl Landmarks {
    pub fn new(nose_tip: Point, contour: Vec<Point>, bounding_box: BoundingBox) -> Self {
        Self {
            nose_tip,
            contour,
            bounding_box,
        }
    }
}

/// Outcome of one detection call. Built once, consumed by the effect stage.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    detected: bool,
    landmarks: Option<Landmarks>,
    confidence: f32,
    engine: EngineKind,
}

impl DetectionResult {
    pub fn detected(landmarks: Landmarks, confidence: f32, engine: EngineKind) -> Self {
        Self {
            detected: true,
            landmarks: Some(landmarks),
            confidence: confidence.clamp(0.0, 1.0),
            engine,
        }
    }

    /// "No face": the degraded answer for every failure short of a lost link.
    pub fn not_detected(engine: EngineKind) -> Self {
        Self {
            detected: false,
            landmarks: None,
            confidence: 0.0,
            engine,
        }
    }

    pub fn is_detected(&self) -> bool {
        self.detected
    }

    pub fn landmarks(&self) -> Option<&Landmarks> {
        self.landmarks.as_ref()
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    pub fn engine_name(&self) -> String {
        self.engine.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn landmarks() -> Landmarks {
        Landmarks::new(Point::new(50, 50), vec![], BoundingBox::new(20, 20, 60, 60))
    }

    #[test]
    fn test_not_detected_has_zero_confidence() {
        let r = DetectionResult::not_detected(EngineKind::Dlib);
        assert!(!r.is_detected());
        assert!(r.landmarks().is_none());
        assert_eq!(r.confidence(), 0.0);
        assert_eq!(r.engine_name(), "Dlib");
    }

    #[test]
    fn test_detected_carries_landmarks() {
        let r = DetectionResult::detected(landmarks(), 0.9, EngineKind::MediaPipe);
        assert!(r.is_detected());
        assert_eq!(r.landmarks().unwrap().nose_tip, Point::new(50, 50));
        assert_relative_eq!(r.confidence(), 0.9);
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(DetectionResult::detected(landmarks(), 1.7, EngineKind::Dlib).confidence(), 1.0);
        assert_eq!(DetectionResult::detected(landmarks(), -0.2, EngineKind::Dlib).confidence(), 0.0);
    }
}

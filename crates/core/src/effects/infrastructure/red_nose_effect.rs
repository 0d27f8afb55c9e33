use crate::detection::domain::detection_result::DetectionResult;
use crate::effects::domain::face_effect::{EffectError, FaceEffect};
use crate::shared::frame::Frame;
use crate::shared::geometry::PixelRect;

/// Nose radius as a fraction of the shorter bounding-box side.
pub const DEFAULT_RADIUS_RATIO: f64 = 0.12;

const NOSE_BGR: [f64; 3] = [0.0, 0.0, 255.0];
const HIGHLIGHT_BGR: [f64; 3] = [255.0, 255.0, 255.0];
const HIGHLIGHT_STRENGTH: f64 = 0.6;

/// Paints an anti-aliased red disc on the nose tip with a small specular
/// highlight toward the upper left.
///
/// The disc scales with the face box and is clipped to the intersection of
/// the box and the frame, so pixels outside the box are never touched.
pub struct RedNoseEffect {
    radius_ratio: f64,
}

impl RedNoseEffect {
    pub fn new(radius_ratio: f64) -> Self {
        Self {
            radius_ratio: radius_ratio.max(0.0),
        }
    }

    pub fn radius_for(&self, min_side: i32) -> f64 {
        (min_side as f64 * self.radius_ratio).round().max(1.0)
    }
}

impl Default for RedNoseEffect {
    fn default() -> Self {
        Self::new(DEFAULT_RADIUS_RATIO)
    }
}

impl FaceEffect for RedNoseEffect {
    fn apply(&self, frame: &Frame, result: &DetectionResult) -> Result<Frame, EffectError> {
        let mut output = frame.clone();
        let Some(landmarks) = result.landmarks() else {
            return Ok(output);
        };
        let Some(clip) = landmarks.bounding_box.clip(frame.width(), frame.height()) else {
            return Ok(output);
        };

        let radius = self.radius_for(landmarks.bounding_box.min_side());
        let cx = landmarks.nose_tip.x as f64;
        let cy = landmarks.nose_tip.y as f64;
        let highlight_r = (radius / 4.0).max(0.5);
        let hx = cx - radius / 3.0;
        let hy = cy - radius / 3.0;

        let Some(area) = disc_area(cx, cy, radius, clip) else {
            return Ok(output);
        };

        let mut pixels = output.as_ndarray_mut();
        for y in area.y0..area.y1 {
            for x in area.x0..area.x1 {
                let px = x as f64;
                let py = y as f64;
                let alpha = coverage(px - cx, py - cy, radius);
                if alpha <= 0.0 {
                    continue;
                }
                let shine = coverage(px - hx, py - hy, highlight_r) * HIGHLIGHT_STRENGTH;

                for c in 0..3 {
                    let paint = NOSE_BGR[c] * (1.0 - shine) + HIGHLIGHT_BGR[c] * shine;
                    let original = pixels[[y, x, c]] as f64;
                    pixels[[y, x, c]] = blend(original, paint, alpha);
                }
            }
        }

        Ok(output)
    }

    fn name(&self) -> &'static str {
        "nose"
    }
}

/// Pixels the disc may touch, restricted to `clip`.
fn disc_area(cx: f64, cy: f64, radius: f64, clip: PixelRect) -> Option<PixelRect> {
    let reach = radius + 1.0;
    let x0 = ((cx - reach).floor().max(clip.x0 as f64)) as usize;
    let y0 = ((cy - reach).floor().max(clip.y0 as f64)) as usize;
    let x1 = ((cx + reach).ceil() + 1.0).min(clip.x1 as f64);
    let y1 = ((cy + reach).ceil() + 1.0).min(clip.y1 as f64);
    if x1 <= x0 as f64 || y1 <= y0 as f64 {
        return None;
    }
    Some(PixelRect {
        x0,
        y0,
        x1: x1 as usize,
        y1: y1 as usize,
    })
}

/// Fraction of a pixel covered by a disc edge one pixel wide.
fn coverage(dx: f64, dy: f64, radius: f64) -> f64 {
    let distance = (dx * dx + dy * dy).sqrt();
    (radius + 0.5 - distance).clamp(0.0, 1.0)
}

fn blend(base: f64, paint: f64, alpha: f64) -> u8 {
    (base * (1.0 - alpha) + paint * alpha).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection_result::Landmarks;
    use crate::detection::domain::engine_kind::EngineKind;
    use crate::shared::geometry::{BoundingBox, Point};
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn detection(nose: Point, bbox: BoundingBox) -> DetectionResult {
        DetectionResult::detected(Landmarks::new(nose, vec![], bbox), 0.9, EngineKind::MediaPipe)
    }

    fn pixel(frame: &Frame, x: usize, y: usize) -> [u8; 3] {
        let offset = (y * frame.width() as usize + x) * 3;
        [frame.data()[offset], frame.data()[offset + 1], frame.data()[offset + 2]]
    }

    #[test]
    fn test_changes_only_pixels_inside_bounding_box() {
        let frame = Frame::filled(100, 100, 0, 0);
        let result = detection(Point::new(50, 50), BoundingBox::new(20, 20, 60, 60));
        let output = RedNoseEffect::default().apply(&frame, &result).unwrap();

        let mut changed = 0;
        for y in 0..100 {
            for x in 0..100 {
                if pixel(&output, x, y) != pixel(&frame, x, y) {
                    assert!((20..80).contains(&x) && (20..80).contains(&y), "({x},{y})");
                    changed += 1;
                }
            }
        }
        assert!(changed > 0);
    }

    #[test]
    fn test_output_is_deterministic() {
        let frame = Frame::filled(100, 100, 0, 0);
        let result = detection(Point::new(50, 50), BoundingBox::new(20, 20, 60, 60));
        let effect = RedNoseEffect::default();
        let a = effect.apply(&frame, &result).unwrap();
        let b = effect.apply(&frame, &result).unwrap();
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_input_is_not_mutated() {
        let frame = Frame::filled(100, 100, 7, 3);
        let result = detection(Point::new(50, 50), BoundingBox::new(20, 20, 60, 60));
        let output = RedNoseEffect::default().apply(&frame, &result).unwrap();
        assert!(frame.data().iter().all(|&b| b == 7));
        assert_eq!(output.index(), 3);
    }

    #[test]
    fn test_nose_center_is_red() {
        let frame = Frame::filled(100, 100, 0, 0);
        let result = detection(Point::new(50, 50), BoundingBox::new(20, 20, 60, 60));
        let output = RedNoseEffect::default().apply(&frame, &result).unwrap();

        let [b, g, r] = pixel(&output, 52, 52);
        assert_eq!(r, 255);
        assert_eq!((b, g), (0, 0));
    }

    #[test]
    fn test_not_detected_returns_copy() {
        let frame = Frame::filled(10, 10, 42, 0);
        let result = DetectionResult::not_detected(EngineKind::Dlib);
        let output = RedNoseEffect::default().apply(&frame, &result).unwrap();
        assert_eq!(output.data(), frame.data());
    }

    #[test]
    fn test_box_outside_frame_leaves_frame_unchanged() {
        let frame = Frame::filled(50, 50, 0, 0);
        let result = detection(Point::new(200, 200), BoundingBox::new(180, 180, 40, 40));
        let output = RedNoseEffect::default().apply(&frame, &result).unwrap();
        assert_eq!(output.data(), frame.data());
    }

    #[test]
    fn test_nose_near_box_edge_is_clipped() {
        let frame = Frame::filled(100, 100, 0, 0);
        let result = detection(Point::new(21, 50), BoundingBox::new(20, 20, 60, 60));
        let output = RedNoseEffect::default().apply(&frame, &result).unwrap();
        for y in 0..100 {
            assert_eq!(pixel(&output, 19, y), [0, 0, 0]);
        }
        assert_ne!(pixel(&output, 21, 50), [0, 0, 0]);
    }

    #[rstest]
    #[case(60, 7.0)]
    #[case(100, 12.0)]
    #[case(0, 1.0)]
    #[case(3, 1.0)]
    fn test_radius_scales_with_box(#[case] min_side: i32, #[case] expected: f64) {
        assert_relative_eq!(RedNoseEffect::default().radius_for(min_side), expected);
    }
}

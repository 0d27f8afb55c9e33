use crate::detection::domain::detection_result::DetectionResult;
use crate::effects::domain::face_effect::{EffectError, FaceEffect};
use crate::shared::frame::Frame;
use crate::shared::geometry::{PixelRect, Point};

const DEFAULT_LINE_BGR: [u8; 3] = [0, 255, 0];

/// Traces the face contour as an open polyline, one pixel wide, clipped to
/// the face box.
pub struct ContourEffect {
    color: [u8; 3],
}

impl ContourEffect {
    pub fn new(color: [u8; 3]) -> Self {
        Self { color }
    }
}

impl Default for ContourEffect {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_BGR)
    }
}

impl FaceEffect for ContourEffect {
    fn apply(&self, frame: &Frame, result: &DetectionResult) -> Result<Frame, EffectError> {
        let mut output = frame.clone();
        let Some(landmarks) = result.landmarks() else {
            return Ok(output);
        };
        let Some(clip) = landmarks.bounding_box.clip(frame.width(), frame.height()) else {
            return Ok(output);
        };

        let mut pixels = output.as_ndarray_mut();
        let mut plot = |p: Point| {
            if p.x < 0 || p.y < 0 {
                return;
            }
            let (x, y) = (p.x as usize, p.y as usize);
            if clip.contains(x, y) {
                for (c, value) in self.color.iter().enumerate() {
                    pixels[[y, x, c]] = *value;
                }
            }
        };

        match landmarks.contour.as_slice() {
            [] => {}
            [only] => plot(*only),
            points => {
                for pair in points.windows(2) {
                    for p in line_points(pair[0], pair[1], clip) {
                        plot(p);
                    }
                }
            }
        }

        Ok(output)
    }

    fn name(&self) -> &'static str {
        "contour"
    }
}

/// Bresenham rasterisation from `a` to `b`, inclusive of both ends.
///
/// Segments wholly on one side of `clip` yield nothing, so absurd
/// coordinates from the detector never cost a long walk.
fn line_points(a: Point, b: Point, clip: PixelRect) -> Vec<Point> {
    let (x0, y0, x1, y1) = (a.x as i64, a.y as i64, b.x as i64, b.y as i64);
    let (cx0, cy0, cx1, cy1) = (clip.x0 as i64, clip.y0 as i64, clip.x1 as i64, clip.y1 as i64);
    if x0.max(x1) < cx0 || x0.min(x1) >= cx1 || y0.max(y1) < cy0 || y0.min(y1) >= cy1 {
        return Vec::new();
    }

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);

    let mut points = Vec::with_capacity((dx.max(-dy) + 1) as usize);
    loop {
        if x >= cx0 && x < cx1 && y >= cy0 && y < cy1 {
            points.push(Point::new(x as i32, y as i32));
        }
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection_result::Landmarks;
    use crate::detection::domain::engine_kind::EngineKind;
    use crate::shared::geometry::BoundingBox;

    fn detection(contour: Vec<Point>, bbox: BoundingBox) -> DetectionResult {
        DetectionResult::detected(
            Landmarks::new(Point::new(50, 50), contour, bbox),
            0.8,
            EngineKind::Dlib,
        )
    }

    fn is_green(frame: &Frame, x: usize, y: usize) -> bool {
        let offset = (y * frame.width() as usize + x) * 3;
        frame.data()[offset..offset + 3] == [0, 255, 0]
    }

    fn full_clip() -> PixelRect {
        PixelRect { x0: 0, y0: 0, x1: 100, y1: 100 }
    }

    #[test]
    fn test_horizontal_line() {
        let points = line_points(Point::new(2, 5), Point::new(6, 5), full_clip());
        let xs: Vec<i32> = points.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![2, 3, 4, 5, 6]);
        assert!(points.iter().all(|p| p.y == 5));
    }

    #[test]
    fn test_diagonal_line_is_inclusive() {
        let points = line_points(Point::new(0, 0), Point::new(3, 3), full_clip());
        assert_eq!(points.first(), Some(&Point::new(0, 0)));
        assert_eq!(points.last(), Some(&Point::new(3, 3)));
        assert_eq!(points.len(), 4);
    }

    #[test]
    fn test_far_away_segment_is_skipped() {
        let points = line_points(
            Point::new(-1_000_000, -5),
            Point::new(1_000_000, -5),
            full_clip(),
        );
        assert!(points.is_empty());
    }

    #[test]
    fn test_draws_polyline_within_box() {
        let frame = Frame::filled(100, 100, 0, 0);
        let contour = vec![Point::new(30, 40), Point::new(70, 40), Point::new(70, 70)];
        let output = ContourEffect::default()
            .apply(&frame, &detection(contour, BoundingBox::new(20, 20, 60, 60)))
            .unwrap();

        assert!(is_green(&output, 30, 40));
        assert!(is_green(&output, 50, 40));
        assert!(is_green(&output, 70, 55));
        assert!(!is_green(&output, 30, 70));
    }

    #[test]
    fn test_points_outside_box_are_clipped() {
        let frame = Frame::filled(100, 100, 0, 0);
        let contour = vec![Point::new(0, 50), Point::new(99, 50)];
        let output = ContourEffect::default()
            .apply(&frame, &detection(contour, BoundingBox::new(20, 20, 60, 60)))
            .unwrap();

        assert!(!is_green(&output, 10, 50));
        assert!(!is_green(&output, 85, 50));
        assert!(is_green(&output, 20, 50));
        assert!(is_green(&output, 79, 50));
        assert!(!is_green(&output, 80, 50));
    }

    #[test]
    fn test_empty_contour_leaves_frame_unchanged() {
        let frame = Frame::filled(100, 100, 9, 0);
        let output = ContourEffect::default()
            .apply(&frame, &detection(vec![], BoundingBox::new(20, 20, 60, 60)))
            .unwrap();
        assert_eq!(output.data(), frame.data());
    }

    #[test]
    fn test_single_point_contour() {
        let frame = Frame::filled(100, 100, 0, 0);
        let output = ContourEffect::default()
            .apply(&frame, &detection(vec![Point::new(25, 25)], BoundingBox::new(20, 20, 60, 60)))
            .unwrap();
        assert!(is_green(&output, 25, 25));
    }

    #[test]
    fn test_input_frame_untouched() {
        let frame = Frame::filled(100, 100, 0, 0);
        let contour = vec![Point::new(30, 40), Point::new(70, 40)];
        ContourEffect::default()
            .apply(&frame, &detection(contour, BoundingBox::new(20, 20, 60, 60)))
            .unwrap();
        assert!(frame.data().iter().all(|&b| b == 0));
    }
}

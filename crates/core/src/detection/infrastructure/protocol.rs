//! Line-delimited JSON protocol spoken with the detector process.
//!
//! One UTF-8 JSON object per line, no embedded newlines. The protocol has no
//! request ids: the n-th response line answers the n-th request line.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::detection::domain::detection_result::Landmarks;
use crate::detection::domain::engine_kind::EngineKind;
use crate::shared::frame::Frame;
use crate::shared::geometry::{BoundingBox, Point};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty response line")]
    Empty,
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("detector reported failure: {0}")]
    Reported(String),
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum Request {
    Detect {
        engine: EngineKind,
        /// Base64 of the raw BGR buffer.
        image: String,
        width: u32,
        height: u32,
    },
    Shutdown,
}

impl Request {
    pub fn detect(frame: &Frame, engine: EngineKind) -> Self {
        Request::Detect {
            engine,
            image: BASE64.encode(frame.data()),
            width: frame.width(),
            height: frame.height(),
        }
    }

    /// Serialises to a single line, without the trailing delimiter.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub faces: Vec<FaceDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceDto {
    pub nose_tip: PointDto,
    pub bounding_box: BoxDto,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub face_contour: Vec<PointDto>,
    #[serde(default)]
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PointDto {
    #[serde(deserialize_with = "pixel")]
    pub x: i32,
    #[serde(deserialize_with = "pixel")]
    pub y: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoxDto {
    #[serde(deserialize_with = "pixel")]
    pub x: i32,
    #[serde(deserialize_with = "pixel")]
    pub y: i32,
    #[serde(deserialize_with = "pixel")]
    pub width: i32,
    #[serde(deserialize_with = "pixel")]
    pub height: i32,
}

impl From<PointDto> for Point {
    fn from(p: PointDto) -> Self {
        Point::new(p.x, p.y)
    }
}

impl From<Point> for PointDto {
    fn from(p: Point) -> Self {
        PointDto { x: p.x, y: p.y }
    }
}

impl FaceDto {
    pub fn from_landmarks(landmarks: &Landmarks, confidence: f32) -> Self {
        let b = landmarks.bounding_box;
        FaceDto {
            nose_tip: landmarks.nose_tip.into(),
            bounding_box: BoxDto {
                x: b.x,
                y: b.y,
                width: b.width,
                height: b.height,
            },
            face_contour: landmarks.contour.iter().copied().map(PointDto::from).collect(),
            confidence,
        }
    }

    pub fn to_landmarks(&self) -> Landmarks {
        let b = self.bounding_box;
        Landmarks::new(
            self.nose_tip.into(),
            self.face_contour.iter().copied().map(Point::from).collect(),
            BoundingBox::new(b.x, b.y, b.width, b.height),
        )
    }
}

impl Response {
    pub fn with_faces(faces: Vec<FaceDto>) -> Self {
        Response {
            success: true,
            faces,
            ..Response::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Response {
            success: false,
            error: Some(error.into()),
            ..Response::default()
        }
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Decodes one response line into the first face, if any.
///
/// Only `faces[0]` is used. `success: false` is an error carrying the
/// detector's message; a successful reply without faces is `Ok(None)`.
pub fn decode_response(line: &str) -> Result<Option<(Landmarks, f32)>, ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ProtocolError::Empty);
    }

    let response: Response = serde_json::from_str(line)?;
    if !response.success {
        return Err(ProtocolError::Reported(
            response.error.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }

    Ok(response
        .faces
        .first()
        .map(|face| (face.to_landmarks(), face.confidence)))
}

/// True for the `{"status":"ready"}` line a freshly launched detector prints.
pub fn is_ready_line(line: &str) -> bool {
    #[derive(Deserialize)]
    struct Status {
        status: String,
    }
    serde_json::from_str::<Status>(line.trim())
        .map(|s| s.status.eq_ignore_ascii_case("ready"))
        .unwrap_or(false)
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts integer or float coordinates; floats round to the nearest pixel.
fn pixel<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() {
        return Err(serde::de::Error::custom("coordinate is not a finite number"));
    }
    Ok(value.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn sample_landmarks() -> Landmarks {
        Landmarks::new(
            Point::new(640, 360),
            vec![Point::new(500, 300), Point::new(-3, 410), Point::new(780, 300)],
            BoundingBox::new(480, 200, 320, 340),
        )
    }

    #[test]
    fn test_detect_request_shape() {
        let frame = Frame::new(vec![1, 2, 3, 4, 5, 6], 2, 1, 0);
        let line = Request::detect(&frame, EngineKind::MediaPipe).to_line().unwrap();

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["command"], "detect");
        assert_eq!(value["engine"], "mediapipe");
        assert_eq!(value["width"], 2);
        assert_eq!(value["height"], 1);
        let image = BASE64.decode(value["image"].as_str().unwrap()).unwrap();
        assert_eq!(image, vec![1, 2, 3, 4, 5, 6]);
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_shutdown_request_shape() {
        assert_eq!(Request::Shutdown.to_line().unwrap(), r#"{"command":"shutdown"}"#);
    }

    #[test]
    fn test_engine_is_embedded_per_request() {
        let frame = Frame::filled(1, 1, 0, 0);
        let line = Request::detect(&frame, EngineKind::Dlib).to_line().unwrap();
        assert!(line.contains(r#""engine":"dlib""#));
    }

    #[test]
    fn test_landmarks_survive_response_round_trip() {
        let landmarks = sample_landmarks();
        let line = Response::with_faces(vec![FaceDto::from_landmarks(&landmarks, 0.9)])
            .to_line()
            .unwrap();

        let (decoded, confidence) = decode_response(&line).unwrap().unwrap();
        assert_eq!(decoded, landmarks);
        assert_relative_eq!(confidence, 0.9);
    }

    #[test]
    fn test_only_first_face_is_used() {
        let line = r#"{"success":true,"faces":[
            {"nose_tip":{"x":1,"y":2},"bounding_box":{"x":0,"y":0,"width":5,"height":5},"face_contour":[],"confidence":0.5},
            {"nose_tip":{"x":9,"y":9},"bounding_box":{"x":0,"y":0,"width":5,"height":5},"face_contour":[],"confidence":0.7}
        ]}"#
        .replace('\n', "");
        let (landmarks, confidence) = decode_response(&line).unwrap().unwrap();
        assert_eq!(landmarks.nose_tip, Point::new(1, 2));
        assert_relative_eq!(confidence, 0.5);
    }

    #[rstest]
    #[case(r#"{"success":true,"faces":[]}"#)]
    #[case(r#"{"success":true,"faces":null}"#)]
    #[case(r#"{"success":true}"#)]
    #[case(r#"{"success":true,"message":"Shutting down"}"#)]
    fn test_no_faces_is_none(#[case] line: &str) {
        assert!(decode_response(line).unwrap().is_none());
    }

    #[test]
    fn test_failure_is_reported_with_message() {
        let line = Response::failure("bad image").to_line().unwrap();
        match decode_response(&line) {
            Err(ProtocolError::Reported(msg)) => assert_eq!(msg, "bad image"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_failure_without_message() {
        assert!(matches!(
            decode_response(r#"{"success":false}"#),
            Err(ProtocolError::Reported(msg)) if msg == "unknown error"
        ));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn test_empty_line(#[case] line: &str) {
        assert!(matches!(decode_response(line), Err(ProtocolError::Empty)));
    }

    #[rstest]
    #[case("not json")]
    #[case(r#"{"faces":[]}"#)]
    #[case(r#"{"success":true,"faces":[{"bounding_box":{"x":0,"y":0,"width":1,"height":1}}]}"#)]
    fn test_malformed(#[case] line: &str) {
        assert!(matches!(decode_response(line), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_float_contour_points_round_to_pixels() {
        let line = r#"{"success":true,"faces":[{"nose_tip":{"x":10,"y":10},"bounding_box":{"x":0,"y":0,"width":20,"height":20},"face_contour":[{"x":3.4,"y":7.6}],"confidence":0.95}]}"#;
        let (landmarks, _) = decode_response(line).unwrap().unwrap();
        assert_eq!(landmarks.contour, vec![Point::new(3, 8)]);
    }

    #[test]
    fn test_negative_box_size_is_clamped() {
        let line = r#"{"success":true,"faces":[{"nose_tip":{"x":0,"y":0},"bounding_box":{"x":5,"y":5,"width":-4,"height":10}}]}"#;
        let (landmarks, confidence) = decode_response(line).unwrap().unwrap();
        assert_eq!(landmarks.bounding_box.width, 0);
        assert!(landmarks.contour.is_empty());
        assert_eq!(confidence, 0.0);
    }

    #[rstest]
    #[case(r#"{"status":"ready"}"#, true)]
    #[case(r#"  {"status":"READY"}  "#, true)]
    #[case(r#"{"status":"loading"}"#, false)]
    #[case("ready", false)]
    #[case("", false)]
    fn test_ready_line(#[case] line: &str, #[case] ready: bool) {
        assert_eq!(is_ready_line(line), ready);
    }

    #[test]
    fn test_canonical_ready_line() {
        assert!(is_ready_line(crate::shared::constants::READY_LINE));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name reported for any face that was not verified against the dataset.
pub const UNKNOWN: &str = "Unknown";

/// Raw detector output in frame pixel space, before clamping.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Integer face rectangle guaranteed to lie inside the frame it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Clamp a raw detection to a `frame_width` × `frame_height` frame.
    ///
    /// Returns `None` when nothing of the box remains inside the frame.
    pub fn from_detection(det: &BoundingBox, frame_width: u32, frame_height: u32) -> Option<Self> {
        if !(det.x.is_finite() && det.y.is_finite() && det.width.is_finite() && det.height.is_finite()) {
            return None;
        }
        let x1 = det.x.round().clamp(0.0, frame_width as f32) as u32;
        let y1 = det.y.round().clamp(0.0, frame_height as f32) as u32;
        let x2 = (det.x + det.width).round().clamp(0.0, frame_width as f32) as u32;
        let y2 = (det.y + det.height).round().clamp(0.0, frame_height as f32) as u32;

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Copy of this embedding scaled to unit length. Zero vectors are returned as-is.
    pub fn l2_normalized(&self) -> Embedding {
        let norm = self.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            self.values.iter().map(|v| v / norm).collect()
        } else {
            self.values.clone()
        };
        Embedding {
            values,
            model_version: self.model_version.clone(),
        }
    }
}

/// Outcome of one identity-matching attempt.
///
/// `verified` is true only when a distance is present and within the
/// threshold; `matched_name` is [`UNKNOWN`] whenever `verified` is false.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
    pub matched_name: String,
    pub distance: Option<f32>,
    /// Threshold-relative score in [0, 1]; not a probability.
    pub confidence: f32,
    pub verified: bool,
    pub reason: String,
}

impl RecognitionResult {
    /// An unverified result carrying only a reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            matched_name: UNKNOWN.to_string(),
            distance: None,
            confidence: 0.0,
            verified: false,
            reason: reason.into(),
        }
    }

    /// Human-readable decision reason shared by the display and the attempt log.
    pub fn decision_reason(&self) -> String {
        if self.verified {
            "Face found in dataset".to_string()
        } else {
            format!("Face not found in dataset: {}", self.reason)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "GRANTED")]
    Granted,
    #[serde(rename = "DENIED")]
    Denied,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Granted => f.write_str("GRANTED"),
            Verdict::Denied => f.write_str("DENIED"),
        }
    }
}

/// One completed access attempt, as persisted by the attempt sinks.
///
/// Field order is the column order of the local log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub timestamp: DateTime<Utc>,
    pub detected_name: String,
    pub confidence: f64,
    pub granted_or_denied: Verdict,
    pub reason: String,
}

impl AttemptRecord {
    /// Column names of the local log, in serialization order.
    pub const COLUMNS: [&'static str; 5] = [
        "timestamp",
        "detected_name",
        "confidence",
        "granted_or_denied",
        "reason",
    ];

    pub fn from_result(result: &RecognitionResult, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            detected_name: result.matched_name.clone(),
            confidence: round4(result.confidence as f64),
            granted_or_denied: if result.verified { Verdict::Granted } else { Verdict::Denied },
            reason: result.decision_reason(),
        }
    }

    pub fn granted(&self) -> bool {
        self.granted_or_denied == Verdict::Granted
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    Waiting,
    AccessGiven,
    AccessDenied,
}

impl fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessStatus::Waiting => f.write_str("WAITING"),
            AccessStatus::AccessGiven => f.write_str("ACCESS GIVEN"),
            AccessStatus::AccessDenied => f.write_str("ACCESS DENIED"),
        }
    }
}

/// The decision currently shown to the person at the kiosk.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayStatus {
    pub name: String,
    pub confidence: f32,
    pub status: AccessStatus,
    pub reason: String,
}

impl DisplayStatus {
    pub fn from_result(result: &RecognitionResult) -> Self {
        Self {
            name: result.matched_name.clone(),
            confidence: result.confidence,
            status: if result.verified {
                AccessStatus::AccessGiven
            } else {
                AccessStatus::AccessDenied
            },
            reason: result.decision_reason(),
        }
    }
}

impl Default for DisplayStatus {
    fn default() -> Self {
        Self {
            name: UNKNOWN.to_string(),
            confidence: 0.0,
            status: AccessStatus::Waiting,
            reason: "No scan yet".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn det(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9 }
    }

    fn verified(name: &str, distance: f32, confidence: f32) -> RecognitionResult {
        RecognitionResult {
            matched_name: name.to_string(),
            distance: Some(distance),
            confidence,
            verified: true,
            reason: "Face matched".to_string(),
        }
    }

    #[test]
    fn test_face_box_inside_frame_is_rounded() {
        let fb = FaceBox::from_detection(&det(10.4, 20.6, 100.2, 50.0), 640, 480).unwrap();
        assert_eq!(fb, FaceBox { x: 10, y: 21, width: 101, height: 50 });
    }

    #[test]
    fn test_face_box_clamped_to_frame() {
        let fb = FaceBox::from_detection(&det(-30.0, -10.0, 100.0, 100.0), 64, 48).unwrap();
        assert_eq!(fb, FaceBox { x: 0, y: 0, width: 64, height: 48 });
        assert!(fb.x + fb.width <= 64);
        assert!(fb.y + fb.height <= 48);
    }

    #[test]
    fn test_face_box_outside_frame_is_none() {
        assert!(FaceBox::from_detection(&det(700.0, 10.0, 50.0, 50.0), 640, 480).is_none());
        assert!(FaceBox::from_detection(&det(f32::NAN, 10.0, 50.0, 50.0), 640, 480).is_none());
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding { values: vec![1.0, 0.0, 0.0], model_version: None };
        assert!((a.similarity(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding { values: vec![0.0, 0.0], model_version: None };
        let b = Embedding { values: vec![1.0, 0.0], model_version: None };
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_l2_normalized_has_unit_length() {
        let a = Embedding { values: vec![3.0, 4.0], model_version: None };
        let n = a.l2_normalized();
        assert!((n.values[0] - 0.6).abs() < 1e-6);
        assert!((n.values[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_attempt_record_rounds_confidence() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let record = AttemptRecord::from_result(&verified("Alice", 0.2, 0.428_571_4), at);
        assert_eq!(record.confidence, 0.4286);
        assert_eq!(record.granted_or_denied, Verdict::Granted);
        assert_eq!(record.detected_name, "Alice");
        assert_eq!(record.reason, "Face found in dataset");
        assert_eq!(record.timestamp, at);
    }

    #[test]
    fn test_attempt_record_denied_keeps_failure_reason() {
        let result = RecognitionResult::rejected("Dataset is empty or missing");
        let record = AttemptRecord::from_result(&result, Utc::now());
        assert!(!record.granted());
        assert_eq!(record.detected_name, UNKNOWN);
        assert_eq!(record.reason, "Face not found in dataset: Dataset is empty or missing");
    }

    #[test]
    fn test_display_status_default_is_waiting() {
        let status = DisplayStatus::default();
        assert_eq!(status.status, AccessStatus::Waiting);
        assert_eq!(status.reason, "No scan yet");
        assert_eq!(status.name, UNKNOWN);
        assert_eq!(status.status.to_string(), "WAITING");
    }

    #[test]
    fn test_display_status_from_result() {
        let given = DisplayStatus::from_result(&verified("Bob", 0.1, 0.7));
        assert_eq!(given.status, AccessStatus::AccessGiven);
        assert_eq!(given.status.to_string(), "ACCESS GIVEN");

        let denied = DisplayStatus::from_result(&RecognitionResult::rejected("No candidate found"));
        assert_eq!(denied.status, AccessStatus::AccessDenied);
        assert_eq!(denied.name, UNKNOWN);
    }
}

//! Detection events as delivered by the inference pipeline.
//!
//! One event per stream message, JSON-encoded:
//!
//! ```json
//! {"camera_id": "cam_3", "event_type": "weapon_detected",
//!  "timestamp": "2026-01-01T12:00:00+00:00", "confidence": 0.92,
//!  "bounding_box": {"x": 0.1, "y": 0.2, "width": 0.15, "height": 0.2}}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event types that require immediate operator attention.
pub const THREAT_TYPES: [&str; 2] = ["weapon_detected", "fight"];

/// Whether `event_type` belongs to the fixed threat set.
pub fn is_threat_type(event_type: &str) -> bool {
    matches!(event_type, "weapon_detected" | "fight")
}

/// Normalized (0.0-1.0) bounding box of the detection within the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A single inference result for one camera at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub camera_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

impl DetectionEvent {
    /// Parse a single stream message.
    ///
    /// Rejects confidences outside `[0, 1]` and empty camera ids in addition
    /// to structurally invalid JSON.
    pub fn parse(payload: &str) -> Result<Self, EventParseError> {
        let event: DetectionEvent = serde_json::from_str(payload)?;
        if event.camera_id.is_empty() {
            return Err(EventParseError::MissingCamera);
        }
        if !(0.0..=1.0).contains(&event.confidence) {
            return Err(EventParseError::ConfidenceOutOfRange(event.confidence));
        }
        Ok(event)
    }

    pub fn is_threat(&self) -> bool {
        is_threat_type(&self.event_type)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventParseError {
    #[error("invalid event payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event has empty camera_id")]
    MissingCamera,
    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    /// Fixed epoch used as t=0 across the crate's tests.
    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    pub fn at_ms(ms: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::milliseconds(ms)
    }

    pub fn event(camera_id: &str, event_type: &str, ms: i64) -> DetectionEvent {
        DetectionEvent {
            camera_id: camera_id.to_string(),
            event_type: event_type.to_string(),
            timestamp: at_ms(ms),
            confidence: 0.9,
            bounding_box: BoundingBox {
                x: 0.1,
                y: 0.1,
                width: 0.2,
                height: 0.2,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_payload() {
        let json = r#"{
            "camera_id": "cam_3",
            "event_type": "weapon_detected",
            "timestamp": "2026-01-01T12:00:00.123456+00:00",
            "confidence": 0.92,
            "bounding_box": {"x": 0.12, "y": 0.3, "width": 0.2, "height": 0.18}
        }"#;

        let event = DetectionEvent::parse(json).unwrap();
        assert_eq!(event.camera_id, "cam_3");
        assert_eq!(event.event_type, "weapon_detected");
        assert_eq!(event.confidence, 0.92);
        assert_eq!(event.bounding_box.height, 0.18);
        assert!(event.is_threat());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(DetectionEvent::parse("not json").is_err());
        assert!(DetectionEvent::parse(r#"{"camera_id": "cam_1"}"#).is_err());

        let bad_confidence = r#"{"camera_id": "cam_1", "event_type": "fight",
            "timestamp": "2026-01-01T12:00:00Z", "confidence": 1.5,
            "bounding_box": {"x": 0, "y": 0, "width": 0, "height": 0}}"#;
        assert!(matches!(
            DetectionEvent::parse(bad_confidence),
            Err(EventParseError::ConfidenceOutOfRange(_))
        ));

        let no_camera = r#"{"camera_id": "", "event_type": "fight",
            "timestamp": "2026-01-01T12:00:00Z", "confidence": 0.5,
            "bounding_box": {"x": 0, "y": 0, "width": 0, "height": 0}}"#;
        assert!(matches!(
            DetectionEvent::parse(no_camera),
            Err(EventParseError::MissingCamera)
        ));
    }

    #[test]
    fn test_threat_set() {
        for t in THREAT_TYPES {
            assert!(is_threat_type(t));
        }
        assert!(!is_threat_type("person_detected"));
        assert!(!is_threat_type("fire_smoke"));
        assert!(!is_threat_type("person_falling"));
    }
}

//! Per-camera "latest known state".

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::event::{is_threat_type, DetectionEvent};

/// Latest event of one type, tagged with when that type first appeared so
/// timestamp ties in `last_event` resolve the same way every time.
#[derive(Debug, Clone, PartialEq)]
struct Entry {
    event: DetectionEvent,
    first_seen: u64,
}

/// Folded state for a single camera. Owned exclusively by the aggregator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraState {
    latest_by_type: HashMap<String, Entry>,
    has_threat: bool,
    last_event_type: Option<String>,
}

impl CameraState {
    /// Last-write-wins per event type. The inbound order is trusted; an older
    /// timestamp arriving later still replaces the entry.
    pub(crate) fn upsert(&mut self, event: DetectionEvent, seq: u64) {
        match self.latest_by_type.get_mut(&event.event_type) {
            Some(entry) => entry.event = event,
            None => {
                self.latest_by_type
                    .insert(event.event_type.clone(), Entry { event, first_seen: seq });
            }
        }
        self.refresh();
    }

    /// Drop entries whose age reached `window`. Returns how many were removed.
    pub(crate) fn expire(&mut self, now: DateTime<Utc>, window: Duration) -> usize {
        let before = self.latest_by_type.len();
        self.latest_by_type
            .retain(|_, entry| now - entry.event.timestamp < window);
        let removed = before - self.latest_by_type.len();
        if removed > 0 {
            self.refresh();
        }
        removed
    }

    fn refresh(&mut self) {
        self.has_threat = self.latest_by_type.keys().any(|t| is_threat_type(t));
        self.last_event_type = self
            .latest_by_type
            .iter()
            .max_by(|(_, a), (_, b)| {
                a.event
                    .timestamp
                    .cmp(&b.event.timestamp)
                    .then(b.first_seen.cmp(&a.first_seen))
            })
            .map(|(event_type, _)| event_type.clone());
    }

    pub fn has_threat(&self) -> bool {
        self.has_threat
    }

    pub fn has_activity(&self) -> bool {
        !self.latest_by_type.is_empty()
    }

    /// The retained event with the greatest timestamp.
    pub fn last_event(&self) -> Option<&DetectionEvent> {
        self.last_event_type
            .as_ref()
            .and_then(|t| self.latest_by_type.get(t))
            .map(|entry| &entry.event)
    }

    pub fn latest(&self, event_type: &str) -> Option<&DetectionEvent> {
        self.latest_by_type.get(event_type).map(|entry| &entry.event)
    }

    pub fn latest_by_type(&self) -> impl Iterator<Item = (&str, &DetectionEvent)> {
        self.latest_by_type
            .iter()
            .map(|(t, entry)| (t.as_str(), &entry.event))
    }

    pub fn len(&self) -> usize {
        self.latest_by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest_by_type.is_empty()
    }
}

/// Read-only view of a camera's state handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraSummary {
    pub camera_id: String,
    pub has_threat: bool,
    pub has_activity: bool,
    pub last_event: Option<DetectionEvent>,
    /// Event types currently inside the window, sorted.
    pub active_types: Vec<String>,
}

impl CameraSummary {
    pub fn from_state(camera_id: &str, state: &CameraState) -> Self {
        let mut active_types: Vec<String> =
            state.latest_by_type.keys().cloned().collect();
        active_types.sort();
        Self {
            camera_id: camera_id.to_string(),
            has_threat: state.has_threat(),
            has_activity: state.has_activity(),
            last_event: state.last_event().cloned(),
            active_types,
        }
    }
}

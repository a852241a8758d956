//! Camera state aggregation: folds the live event stream into per-camera
//! summaries and expires them on a time window.

mod state;

pub use self::state::{CameraState, CameraSummary};

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::event::DetectionEvent;

/// Default age at which a camera's per-type entry is considered stale.
pub const DEFAULT_THREAT_WINDOW: std::time::Duration = std::time::Duration::from_millis(10_000);

/// Outcome of a single sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Per-type entries removed across all cameras.
    pub expired: usize,
    /// Cameras whose state became empty and was deleted.
    pub removed_cameras: Vec<String>,
}

impl SweepReport {
    pub fn changed(&self) -> bool {
        self.expired > 0
    }
}

/// Owns every `CameraState` of a session.
#[derive(Debug)]
pub struct CameraStateAggregator {
    cameras: HashMap<String, CameraState>,
    window: Duration,
    seq: u64,
}

impl Default for CameraStateAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_THREAT_WINDOW)
    }
}

impl CameraStateAggregator {
    /// A window too large for chrono saturates, so entries never expire.
    pub fn new(window: std::time::Duration) -> Self {
        let window = Duration::from_std(window).unwrap_or_else(|_| {
            warn!(
                window_ms = window.as_millis() as u64,
                "threat window out of range, entries will not expire"
            );
            Duration::MAX
        });
        Self {
            cameras: HashMap::new(),
            window,
            seq: 0,
        }
    }

    /// Fold one event into its camera's state.
    pub fn ingest(&mut self, event: DetectionEvent) {
        self.seq += 1;
        let seq = self.seq;
        self.cameras
            .entry(event.camera_id.clone())
            .or_default()
            .upsert(event, seq);
    }

    /// Expire entries older than the window relative to `now` and delete
    /// cameras left with nothing. Depends only on `now` and current state.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> SweepReport {
        let window = self.window;
        let mut report = SweepReport::default();

        for state in self.cameras.values_mut() {
            report.expired += state.expire(now, window);
        }

        let removed = &mut report.removed_cameras;
        self.cameras.retain(|camera_id, state| {
            if state.is_empty() {
                removed.push(camera_id.clone());
                false
            } else {
                true
            }
        });
        removed.sort();

        if report.changed() {
            debug!(
                expired = report.expired,
                removed = report.removed_cameras.len(),
                "sweep expired stale camera state"
            );
        }
        report
    }

    pub fn get(&self, camera_id: &str) -> Option<&CameraState> {
        self.cameras.get(camera_id)
    }

    /// Summaries for every tracked camera, ordered by camera id.
    pub fn summaries(&self) -> Vec<CameraSummary> {
        let mut summaries: Vec<CameraSummary> = self
            .cameras
            .iter()
            .map(|(id, state)| CameraSummary::from_state(id, state))
            .collect();
        summaries.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        summaries
    }

    /// Number of cameras currently flagged with a threat.
    pub fn threatened(&self) -> usize {
        self.cameras.values().filter(|s| s.has_threat()).count()
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

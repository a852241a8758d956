//! A dashboard session: one aggregator, one log buffer, one threat counter,
//! and the tasks that drive them.
//!
//! All mutation happens on the session task, which interleaves inbound
//! events with the sweep and flush timers. Each update runs to completion
//! before the next one starts. Readers get immutable snapshots through
//! `watch` channels.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregate::{CameraStateAggregator, CameraSummary, SweepReport};
use crate::config::DashboardConfig;
use crate::event::DetectionEvent;
use crate::eventlog::{FlushReport, LogBuffer};
use crate::stream::{ConnectionState, EventTransport, StreamManager, ThreatCounter};

// ---------------------------------------------------------------------------
// Dashboard state
// ---------------------------------------------------------------------------

/// Session-owned presentation state.
#[derive(Debug)]
pub struct Dashboard {
    aggregator: CameraStateAggregator,
    log: LogBuffer,
}

impl Dashboard {
    pub fn new(threat_window: Duration, max_log_events: usize) -> Self {
        Self {
            aggregator: CameraStateAggregator::new(threat_window),
            log: LogBuffer::new(max_log_events),
        }
    }

    /// Fold the event into camera state and queue it for the log.
    pub fn apply(&mut self, event: DetectionEvent) {
        self.log.append(event.clone());
        self.aggregator.ingest(event);
    }

    pub fn sweep(&mut self, now: DateTime<Utc>) -> SweepReport {
        self.aggregator.sweep(now)
    }

    pub fn flush(&mut self, now: DateTime<Utc>) -> Option<FlushReport> {
        self.log.flush(now)
    }

    pub fn aggregator(&self) -> &CameraStateAggregator {
        &self.aggregator
    }

    pub fn log(&self) -> &LogBuffer {
        &self.log
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub threat_window: Duration,
    pub sweep_interval: Duration,
    pub flush_interval: Duration,
    pub max_log_events: usize,
    pub reconnect_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&DashboardConfig::default())
    }
}

impl From<&DashboardConfig> for SessionSettings {
    fn from(cfg: &DashboardConfig) -> Self {
        Self {
            threat_window: Duration::from_millis(cfg.events.threat_window_ms),
            sweep_interval: Duration::from_millis(cfg.events.sweep_interval_ms),
            flush_interval: Duration::from_millis(cfg.events.flush_interval_ms),
            max_log_events: cfg.events.max_log_events,
            reconnect_delay: cfg.stream.reconnect_delay(),
        }
    }
}

// ---------------------------------------------------------------------------
// Read-only view
// ---------------------------------------------------------------------------

/// Cheap-to-clone read handle on a running session.
#[derive(Clone)]
pub struct SessionView {
    id: Uuid,
    cameras: watch::Receiver<Arc<Vec<CameraSummary>>>,
    log: watch::Receiver<Arc<Vec<DetectionEvent>>>,
    connection: watch::Receiver<ConnectionState>,
    threats: ThreatCounter,
}

impl SessionView {
    pub fn new(
        id: Uuid,
        cameras: watch::Receiver<Arc<Vec<CameraSummary>>>,
        log: watch::Receiver<Arc<Vec<DetectionEvent>>>,
        connection: watch::Receiver<ConnectionState>,
        threats: ThreatCounter,
    ) -> Self {
        Self {
            id,
            cameras,
            log,
            connection,
            threats,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Camera summaries as of the last ingest or sweep.
    pub fn cameras(&self) -> Arc<Vec<CameraSummary>> {
        self.cameras.borrow().clone()
    }

    /// Visible log as of the last non-empty flush, oldest first.
    pub fn log(&self) -> Arc<Vec<DetectionEvent>> {
        self.log.borrow().clone()
    }

    pub fn connection(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub fn threat_count(&self) -> u64 {
        self.threats.get()
    }

    /// Resolves when camera summaries change. Errors once the session ends.
    pub async fn cameras_changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.cameras.changed().await
    }

    /// Resolves when the visible log changes. Errors once the session ends.
    pub async fn log_changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.log.changed().await
    }

    pub async fn connection_changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.connection.changed().await
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A running session: stream manager task plus state task.
pub struct Session {
    view: SessionView,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Session {
    /// Spawn the stream manager and the state task. Both stop when `cancel`
    /// fires or [`Session::shutdown`] is called.
    pub fn start<T>(settings: SessionSettings, transport: T, cancel: CancellationToken) -> Self
    where
        T: EventTransport + 'static,
    {
        let id = Uuid::new_v4();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let threats = ThreatCounter::new();
        let manager = StreamManager::new(
            transport,
            settings.reconnect_delay,
            event_tx,
            threats.clone(),
        );
        let connection = manager.subscribe_state();

        let (cameras_tx, cameras_rx) = watch::channel(Arc::new(Vec::new()));
        let (log_tx, log_rx) = watch::channel(Arc::new(Vec::new()));

        let runner = Runner {
            dashboard: Dashboard::new(settings.threat_window, settings.max_log_events),
            events: event_rx,
            cameras: cameras_tx,
            log: log_tx,
            sweep_interval: settings.sweep_interval,
            flush_interval: settings.flush_interval,
        };

        let tracker = TaskTracker::new();
        tracker.spawn(manager.run(cancel.clone()));
        tracker.spawn(runner.run(cancel.clone()));
        tracker.close();

        info!(session = %id, "dashboard session started");
        Self {
            view: SessionView::new(id, cameras_rx, log_rx, connection, threats),
            cancel,
            tracker,
        }
    }

    pub fn view(&self) -> SessionView {
        self.view.clone()
    }

    /// Cancel the session and wait up to `timeout` for its tasks.
    pub async fn shutdown(self, timeout: Duration) {
        self.cancel.cancel();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(session = %self.view.id, "session shutdown timed out");
        } else {
            info!(session = %self.view.id, "dashboard session stopped");
        }
    }
}

const MIN_TICK: Duration = Duration::from_millis(1);

struct Runner {
    dashboard: Dashboard,
    events: mpsc::UnboundedReceiver<DetectionEvent>,
    cameras: watch::Sender<Arc<Vec<CameraSummary>>>,
    log: watch::Sender<Arc<Vec<DetectionEvent>>>,
    sweep_interval: Duration,
    flush_interval: Duration,
}

impl Runner {
    async fn run(mut self, cancel: CancellationToken) {
        // interval() panics on a zero period.
        let mut sweep = tokio::time::interval(self.sweep_interval.max(MIN_TICK));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut flush = tokio::time::interval(self.flush_interval.max(MIN_TICK));
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.events.recv() => {
                    let Some(event) = received else { break };
                    self.dashboard.apply(event);
                    // Fold whatever else is already queued before publishing.
                    while let Ok(event) = self.events.try_recv() {
                        self.dashboard.apply(event);
                    }
                    self.publish_cameras();
                }
                _ = sweep.tick() => {
                    let report = self.dashboard.sweep(Utc::now());
                    if report.changed() {
                        self.publish_cameras();
                    }
                }
                _ = flush.tick() => {
                    if let Some(report) = self.dashboard.flush(Utc::now()) {
                        debug!(moved = report.moved, dropped = report.dropped, "event log flushed");
                        self.publish_log();
                    }
                }
            }
        }
    }

    fn publish_cameras(&self) {
        self.cameras
            .send_replace(Arc::new(self.dashboard.aggregator().summaries()));
    }

    fn publish_log(&self) {
        self.log.send_replace(Arc::new(self.dashboard.log().to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::fixtures::{at_ms, event};
    use crate::stream::testing::{payload, Attempt, ScriptedTransport};

    #[test]
    fn test_weapon_scenario_counter_survives_expiry() {
        let threats = ThreatCounter::new();
        let mut dash = Dashboard::new(Duration::from_millis(10_000), 500);

        let mut weapon = event("cam_3", "weapon_detected", 0);
        weapon.confidence = 0.92;
        if weapon.is_threat() {
            threats.record();
        }
        dash.apply(weapon);

        dash.sweep(at_ms(9_999));
        assert!(dash.aggregator().get("cam_3").unwrap().has_threat());

        dash.sweep(at_ms(10_001));
        assert!(dash.aggregator().get("cam_3").is_none());
        assert_eq!(threats.get(), 1);
    }

    #[test]
    fn test_apply_feeds_both_views() {
        let mut dash = Dashboard::new(Duration::from_millis(10_000), 500);
        dash.apply(event("cam_1", "person_detected", 0));
        dash.apply(event("cam_1", "person_detected", 10));

        assert_eq!(dash.aggregator().len(), 1);
        assert_eq!(dash.log().pending_len(), 2);
        assert!(dash.log().is_empty());

        dash.flush(at_ms(1_000));
        assert_eq!(dash.log().len(), 2);
    }

    fn fast_settings() -> SessionSettings {
        SessionSettings {
            threat_window: Duration::from_millis(300),
            sweep_interval: Duration::from_millis(50),
            flush_interval: Duration::from_millis(100),
            max_log_events: 3,
            reconnect_delay: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_session_publishes_snapshots() {
        let transport = Arc::new(ScriptedTransport::new(vec![Attempt::Deliver(vec![
            payload("cam_1", "fight"),
            payload("cam_2", "person_detected"),
            "garbage".to_string(),
            payload("cam_1", "person_detected"),
            payload("cam_2", "person_falling"),
        ])]));

        let session = Session::start(fast_settings(), transport, CancellationToken::new());
        let mut view = session.view();

        let cameras = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let cameras = view.cameras();
                if cameras.len() == 2 {
                    break cameras;
                }
                view.cameras_changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert!(cameras.iter().any(|c| c.camera_id == "cam_1" && c.has_threat));

        let log = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let log = view.log();
                if !log.is_empty() {
                    break log;
                }
                view.log_changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert!(log.len() <= 3);
        assert_eq!(log.last().unwrap().event_type, "person_falling");
        assert_eq!(view.threat_count(), 1);

        // Everything expires, the threat count does not.
        tokio::time::timeout(Duration::from_secs(2), async {
            while !view.cameras().is_empty() {
                view.cameras_changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert_eq!(view.threat_count(), 1);

        session.shutdown(Duration::from_secs(1)).await;
        assert_eq!(view.connection(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_zero_intervals_still_publish() {
        let mut cfg = DashboardConfig::default();
        cfg.events.sweep_interval_ms = 0;
        cfg.events.flush_interval_ms = 0;

        let transport = Arc::new(ScriptedTransport::new(vec![Attempt::Deliver(vec![
            payload("cam_7", "fight"),
        ])]));
        let session = Session::start(
            SessionSettings::from(&cfg),
            transport,
            CancellationToken::new(),
        );
        let mut view = session.view();
        let mut log_view = session.view();

        tokio::time::timeout(Duration::from_secs(2), async {
            while view.cameras().is_empty() {
                view.cameras_changed().await.unwrap();
            }
            while log_view.log().is_empty() {
                log_view.log_changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert!(view.cameras()[0].has_threat);
        assert_eq!(view.threat_count(), 1);

        session.shutdown(Duration::from_secs(1)).await;
    }
}

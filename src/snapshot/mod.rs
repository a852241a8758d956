//! Per-tile snapshot acquisition.
//!
//! Every mounted tile runs its own poll task with its own cancellation
//! token. A tile holds at most one live frame; installing a new frame
//! releases the previous one under the same lock, and teardown releases the
//! current one before returning.
//!
//! A failed fetch takes the tile offline and ends that poll run. The tile
//! stays offline until it is mounted again.

mod frame;
mod source;

pub use self::frame::{Frame, FrameHandle, ImageFormat};
pub use self::source::{HttpSnapshotSource, SnapshotSource};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay between successful polls, about 15 frames per second.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(66);

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("snapshot endpoint returned HTTP {0}")]
    Status(u16),
    #[error("snapshot payload was empty")]
    EmptyPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollerPhase {
    Polling,
    Offline,
    Cancelled,
}

#[derive(Debug)]
struct TileSlot {
    phase: PollerPhase,
    current: Option<FrameHandle>,
    frames: u64,
}

impl TileSlot {
    fn new() -> Self {
        Self {
            phase: PollerPhase::Polling,
            current: None,
            frames: 0,
        }
    }
}

fn lock(slot: &Mutex<TileSlot>) -> MutexGuard<'_, TileSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One rendered camera tile and its acquisition loop.
pub struct SnapshotTile {
    camera_id: String,
    source: Arc<dyn SnapshotSource>,
    interval: Duration,
    slot: Arc<Mutex<TileSlot>>,
    live: Arc<AtomicUsize>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SnapshotTile {
    /// Mount a tile and start polling. Must be called inside a tokio runtime.
    pub fn mount(
        camera_id: impl Into<String>,
        source: Arc<dyn SnapshotSource>,
        interval: Duration,
    ) -> Self {
        let mut tile = Self {
            camera_id: camera_id.into(),
            source,
            interval,
            slot: Arc::new(Mutex::new(TileSlot::new())),
            live: Arc::new(AtomicUsize::new(0)),
            cancel: CancellationToken::new(),
            task: None,
        };
        tile.start();
        tile
    }

    fn start(&mut self) {
        // A fresh slot per run, so a loop from an earlier run can never
        // install into this one.
        self.slot = Arc::new(Mutex::new(TileSlot::new()));
        self.cancel = CancellationToken::new();

        let poller = Poller {
            camera_id: self.camera_id.clone(),
            source: self.source.clone(),
            interval: self.interval,
            slot: self.slot.clone(),
            live: self.live.clone(),
        };
        self.task = Some(tokio::spawn(poller.run(self.cancel.clone())));
        debug!(camera_id = %self.camera_id, "snapshot tile mounted");
    }

    /// Stop polling and release the current frame. Idempotent.
    pub fn teardown(&mut self) {
        self.cancel.cancel();
        let released = {
            let mut slot = lock(&self.slot);
            if slot.phase == PollerPhase::Cancelled {
                return;
            }
            slot.phase = PollerPhase::Cancelled;
            slot.current.take()
        };
        drop(released);
        debug!(camera_id = %self.camera_id, "snapshot tile torn down");
    }

    /// Tear down and start a fresh run for the same camera. This is the only
    /// way out of `Offline`.
    pub fn remount(&mut self) {
        self.teardown();
        self.start();
    }

    /// Point the tile at a different camera.
    pub fn retarget(&mut self, camera_id: impl Into<String>) {
        self.teardown();
        self.camera_id = camera_id.into();
        self.start();
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn phase(&self) -> PollerPhase {
        lock(&self.slot).phase
    }

    pub fn is_offline(&self) -> bool {
        self.phase() == PollerPhase::Offline
    }

    /// Frames installed during the current run.
    pub fn frames_received(&self) -> u64 {
        lock(&self.slot).frames
    }

    /// Frames of this tile currently alive, across all runs.
    pub fn live_frames(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Borrow the current frame, if any.
    pub fn with_frame<R>(&self, f: impl FnOnce(Option<&Frame>) -> R) -> R {
        let slot = lock(&self.slot);
        f(slot.current.as_deref())
    }

    /// Wait for the current run's task to finish.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(camera_id = %self.camera_id, error = %e, "snapshot poller panicked");
                }
            }
        }
    }
}

impl Drop for SnapshotTile {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct Poller {
    camera_id: String,
    source: Arc<dyn SnapshotSource>,
    interval: Duration,
    slot: Arc<Mutex<TileSlot>>,
    live: Arc<AtomicUsize>,
}

impl Poller {
    async fn run(self, cancel: CancellationToken) {
        let mut seq = 0u64;
        loop {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.source.fetch(&self.camera_id) => result,
            };

            match fetched {
                Ok(data) => {
                    seq += 1;
                    if !self.install(seq, data) {
                        break;
                    }
                }
                Err(e) => {
                    warn!(camera_id = %self.camera_id, error = %e, "snapshot fetch failed, tile offline");
                    self.go_offline();
                    break;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        debug!(camera_id = %self.camera_id, frames = seq, "snapshot poller stopped");
    }

    /// Swap in a new frame. Returns false if the tile was torn down while the
    /// request was in flight; the payload is discarded in that case.
    fn install(&self, seq: u64, data: Bytes) -> bool {
        let frame = Frame::new(&self.camera_id, seq, data);
        let mut slot = lock(&self.slot);
        if slot.phase == PollerPhase::Cancelled {
            return false;
        }
        // Release before counting the new frame so the live total never
        // exceeds one.
        drop(slot.current.take());
        slot.current = Some(FrameHandle::new(frame, self.live.clone()));
        slot.frames += 1;
        true
    }

    fn go_offline(&self) {
        let released = {
            let mut slot = lock(&self.slot);
            if slot.phase == PollerPhase::Cancelled {
                return;
            }
            slot.phase = PollerPhase::Offline;
            slot.current.take()
        };
        drop(released);
        info!(camera_id = %self.camera_id, "snapshot tile offline");
    }
}

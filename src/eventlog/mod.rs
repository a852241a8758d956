//! Bounded, paced history of raw detection events.
//!
//! Ingestion appends to an unbounded pending batch; a periodic flush moves
//! the batch onto the visible log, which keeps at most `capacity` entries.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::event::DetectionEvent;

/// Default visible log capacity.
pub const MAX_LOG_EVENTS: usize = 500;

/// Outcome of a flush that moved at least one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub moved: usize,
    /// Oldest visible entries trimmed to stay within capacity.
    pub dropped: usize,
    pub flushed_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct LogBuffer {
    pending: Vec<DetectionEvent>,
    visible: VecDeque<DetectionEvent>,
    capacity: usize,
    last_flush: Option<DateTime<Utc>>,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(MAX_LOG_EVENTS)
    }
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Vec::new(),
            visible: VecDeque::with_capacity(capacity),
            capacity,
            last_flush: None,
        }
    }

    /// Queue an event for the next flush. Never drops.
    pub fn append(&mut self, event: DetectionEvent) {
        self.pending.push(event);
    }

    /// Move the pending batch onto the visible log in arrival order.
    ///
    /// Returns `None` without touching anything when nothing is pending.
    pub fn flush(&mut self, now: DateTime<Utc>) -> Option<FlushReport> {
        if self.pending.is_empty() {
            return None;
        }

        let moved = self.pending.len();
        self.visible.extend(self.pending.drain(..));

        let overflow = self.visible.len().saturating_sub(self.capacity);
        self.visible.drain(..overflow);
        self.last_flush = Some(now);

        Some(FlushReport {
            moved,
            dropped: overflow,
            flushed_at: now,
        })
    }

    /// Visible events, oldest first.
    pub fn visible(&self) -> impl ExactSizeIterator<Item = &DetectionEvent> {
        self.visible.iter()
    }

    pub fn to_vec(&self) -> Vec<DetectionEvent> {
        self.visible.iter().cloned().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last_flush(&self) -> Option<DateTime<Utc>> {
        self.last_flush
    }
}

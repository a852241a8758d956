//! Materialized snapshot frames and their counted handles.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Unknown,
}

impl ImageFormat {
    /// Identify the payload by its magic bytes.
    pub fn sniff(data: &[u8]) -> Self {
        const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            ImageFormat::Jpeg
        } else if data.starts_with(&PNG_MAGIC) {
            ImageFormat::Png
        } else {
            ImageFormat::Unknown
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Unknown => "application/octet-stream",
        }
    }
}

/// One decoded snapshot for a camera.
#[derive(Debug)]
pub struct Frame {
    pub camera_id: String,
    /// Position of this frame within its poll run, starting at 1.
    pub seq: u64,
    pub format: ImageFormat,
    pub data: Bytes,
    pub received_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(camera_id: &str, seq: u64, data: Bytes) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            seq,
            format: ImageFormat::sniff(&data),
            data,
            received_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A frame installed in a tile. Counts itself in the tile's live total while
/// it exists; dropping the handle releases the frame.
#[derive(Debug)]
pub struct FrameHandle {
    frame: Frame,
    live: Arc<AtomicUsize>,
}

impl FrameHandle {
    pub(crate) fn new(frame: Frame, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self { frame, live }
    }
}

impl Deref for FrameHandle {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.frame
    }
}

impl Drop for FrameHandle {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

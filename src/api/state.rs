use std::sync::Arc;

use crate::roster::CameraDescriptor;
use crate::session::SessionView;

/// Shared handler state: the session's read handle and the roster it started with.
#[derive(Clone)]
pub struct ApiState {
    pub session: SessionView,
    pub roster: Arc<Vec<CameraDescriptor>>,
}

impl ApiState {
    pub fn new(session: SessionView, roster: Vec<CameraDescriptor>) -> Self {
        Self {
            session,
            roster: Arc::new(roster),
        }
    }
}

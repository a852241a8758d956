//! Stream connection manager: owns the live event subscription, reconnects
//! on a fixed delay forever, and hands parsed events to the session.

mod transport;

#[cfg(test)]
pub(crate) use self::transport::testing;
pub use self::transport::{EventTransport, MessageStream, WsTransport};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::event::DetectionEvent;

/// Default wait between a lost connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Session-wide count of threat events received. Never decremented.
#[derive(Debug, Clone, Default)]
pub struct ThreatCounter(Arc<AtomicU64>);

impl ThreatCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Accepted { threat: bool },
    Malformed,
    /// Message came from a superseded connection.
    Stale,
    /// The session stopped listening.
    Closed,
}

pub struct StreamManager<T> {
    transport: T,
    reconnect_delay: Duration,
    sink: mpsc::UnboundedSender<DetectionEvent>,
    threats: ThreatCounter,
    state: watch::Sender<ConnectionState>,
    epoch: u64,
}

impl<T: EventTransport> StreamManager<T> {
    pub fn new(
        transport: T,
        reconnect_delay: Duration,
        sink: mpsc::UnboundedSender<DetectionEvent>,
        threats: ThreatCounter,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            reconnect_delay,
            sink,
            threats,
            state,
            epoch: 0,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn threats(&self) -> &ThreatCounter {
        &self.threats
    }

    /// Connect, read until the connection drops, wait, repeat; until
    /// `cancel` fires or the session stops listening.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(delay_ms = self.reconnect_delay.as_millis() as u64, "event stream manager started");

        'session: loop {
            self.epoch += 1;
            let epoch = self.epoch;
            self.set_state(ConnectionState::Connecting);

            let connected = tokio::select! {
                _ = cancel.cancelled() => break 'session,
                result = self.transport.connect() => result,
            };

            match connected {
                Ok(mut messages) => {
                    self.set_state(ConnectionState::Connected);
                    info!(epoch, "event stream connected");
                    loop {
                        let next = tokio::select! {
                            _ = cancel.cancelled() => break 'session,
                            next = messages.next() => next,
                        };
                        match next {
                            Some(Ok(payload)) => {
                                if self.deliver(epoch, &payload) == Delivery::Closed {
                                    info!("session closed, stopping event stream");
                                    break 'session;
                                }
                            }
                            Some(Err(e)) => {
                                warn!(epoch, error = %e, "event stream failed");
                                break;
                            }
                            None => {
                                warn!(epoch, "event stream closed by peer");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(epoch, error = %e, "event stream unavailable");
                }
            }

            self.set_state(ConnectionState::Disconnected);
            debug!(
                epoch,
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "scheduling event stream reconnect"
            );
            tokio::select! {
                _ = cancel.cancelled() => break 'session,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("event stream manager stopped");
    }

    /// Parse and forward one message received on connection `epoch`.
    pub fn deliver(&self, epoch: u64, payload: &str) -> Delivery {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "dropping message from superseded connection");
            return Delivery::Stale;
        }

        let event = match DetectionEvent::parse(payload) {
            Ok(event) => event,
            Err(e) => {
                trace!(error = %e, "dropping malformed event");
                return Delivery::Malformed;
            }
        };

        let threat = event.is_threat();
        if self.sink.send(event).is_err() {
            return Delivery::Closed;
        }
        if threat {
            let total = self.threats.record();
            debug!(total, "threat event received");
        }
        Delivery::Accepted { threat }
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

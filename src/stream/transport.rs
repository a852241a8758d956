//! Event stream transports.

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use super::StreamError;

/// Raw text messages from one live connection. The stream ends when the
/// connection closes.
pub type MessageStream = BoxStream<'static, Result<String, StreamError>>;

/// Opens a fresh subscription to the event source.
#[async_trait::async_trait]
pub trait EventTransport: Send + Sync {
    async fn connect(&self) -> Result<MessageStream, StreamError>;
}

/// WebSocket subscription to `ws(s)://<host>/ws/events`.
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl EventTransport for WsTransport {
    async fn connect(&self) -> Result<MessageStream, StreamError> {
        info!(url = %self.url, "connecting to event stream");
        let (ws, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        let messages = ws.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                // Binary frames are accepted only if they carry UTF-8 JSON.
                Ok(Message::Binary(data)) => String::from_utf8(data).ok().map(Ok),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "event stream close frame");
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(StreamError::Transport(e.to_string()))),
            }
        });

        Ok(messages.boxed())
    }
}

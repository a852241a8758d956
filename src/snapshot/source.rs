//! Where snapshot frames come from.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;

use super::SnapshotError;

/// Fetches the latest frame for a camera.
#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, camera_id: &str) -> Result<Bytes, SnapshotError>;
}

/// `GET <base_url>/snapshot/<camera_id>`.
#[derive(Clone)]
pub struct HttpSnapshotSource {
    client: Client,
    base_url: String,
}

impl HttpSnapshotSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SnapshotError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self, camera_id: &str) -> String {
        format!("{}/snapshot/{}", self.base_url, camera_id)
    }
}

#[async_trait::async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self, camera_id: &str) -> Result<Bytes, SnapshotError> {
        let response = self.client.get(self.url(camera_id)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SnapshotError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(SnapshotError::EmptyPayload);
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_url() {
        let source = HttpSnapshotSource::with_client(Client::new(), "http://10.0.0.5:8000/");
        assert_eq!(source.url("cam_4"), "http://10.0.0.5:8000/snapshot/cam_4");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        let source =
            HttpSnapshotSource::new("http://127.0.0.1:1", Duration::from_millis(500)).unwrap();
        let result = source.fetch("cam_0").await;
        assert!(matches!(result, Err(SnapshotError::Request(_))));
    }
}

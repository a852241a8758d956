//! Camera roster, fetched once when a session starts.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Online,
    Offline,
}

impl std::fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraStatus::Online => write!(f, "online"),
            CameraStatus::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    pub id: String,
    pub name: String,
    pub location: String,
    pub status: CameraStatus,
    pub stream_url: String,
}

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("roster request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("roster endpoint returned HTTP {0}")]
    Status(u16),
    #[error("invalid roster payload: {0}")]
    Decode(#[from] serde_json::Error),
}

pub fn parse_roster(body: &str) -> Result<Vec<CameraDescriptor>, RosterError> {
    Ok(serde_json::from_str(body)?)
}

/// `GET <base_url>/cameras`.
pub async fn try_fetch_roster(
    client: &Client,
    base_url: &str,
) -> Result<Vec<CameraDescriptor>, RosterError> {
    let url = format!("{}/cameras", base_url.trim_end_matches('/'));
    let response = client.get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(RosterError::Status(status.as_u16()));
    }
    let body = response.text().await?;
    parse_roster(&body)
}

/// Like [`try_fetch_roster`], but any failure yields an empty roster.
pub async fn fetch_roster(client: &Client, base_url: &str) -> Vec<CameraDescriptor> {
    match try_fetch_roster(client, base_url).await {
        Ok(cameras) => {
            info!(count = cameras.len(), "camera roster loaded");
            cameras
        }
        Err(e) => {
            warn!(error = %e, "camera roster unavailable, continuing with none");
            Vec::new()
        }
    }
}

//! surveil -- live detection dashboard runtime.
//!
//! Consumes a detection backend's event stream, folds it into per-camera
//! threat and activity state, keeps a bounded event history, and polls
//! per-camera snapshot frames for display.

pub mod aggregate;
pub mod api;
pub mod config;
pub mod event;
pub mod eventlog;
pub mod roster;
pub mod session;
pub mod snapshot;
pub mod stream;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::DashboardConfig;
use crate::session::{Session, SessionSettings};
use crate::snapshot::{HttpSnapshotSource, SnapshotSource, SnapshotTile};
use crate::stream::WsTransport;

const STATUS_INTERVAL: Duration = Duration::from_secs(10);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run a dashboard session until Ctrl-C: roster, event stream, snapshot
/// tiles, and the optional API.
pub async fn watch(config: DashboardConfig, tiles: bool) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(config.server.request_timeout())
        .build()
        .context("failed to build HTTP client")?;

    // 1. Roster
    let roster = roster::fetch_roster(&client, &config.server.base_url).await;

    // 2. Session
    let cancel = CancellationToken::new();
    let transport = WsTransport::new(config.ws_url());
    let session = Session::start(SessionSettings::from(&config), transport, cancel.child_token());
    let view = session.view();

    // 3. Snapshot tiles
    let mut mounted = Vec::new();
    if tiles && config.snapshots.enabled {
        let source: Arc<dyn SnapshotSource> = Arc::new(HttpSnapshotSource::with_client(
            client.clone(),
            &config.server.base_url,
        ));
        for camera in &roster {
            mounted.push(SnapshotTile::mount(
                camera.id.clone(),
                source.clone(),
                config.snapshots.poll_interval(),
            ));
        }
        tracing::info!(count = mounted.len(), "snapshot tiles mounted");
    }

    // 4. API, bound up front so a bad address fails the command
    let api_task = if config.api.enabled {
        let listener = match api::bind(&config.api.bind).await {
            Ok(listener) => listener,
            Err(e) => {
                cancel.cancel();
                session.shutdown(SHUTDOWN_TIMEOUT).await;
                return Err(e);
            }
        };
        let state = api::ApiState::new(view.clone(), roster.clone());
        let api_cancel = cancel.child_token();
        Some(tokio::spawn(async move {
            let result = api::serve_on(listener, state, api_cancel).await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "dashboard API failed");
            }
            result
        }))
    } else {
        None
    };

    // 5. Status until Ctrl-C
    let mut status = tokio::time::interval(STATUS_INTERVAL);
    status.tick().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "failed to listen for Ctrl-C, shutting down");
                }
                break;
            }
            _ = status.tick() => {
                let cameras = view.cameras();
                let offline = mounted.iter().filter(|t| t.is_offline()).count();
                tracing::info!(
                    connection = ?view.connection(),
                    active_cameras = cameras.len(),
                    threatened = cameras.iter().filter(|c| c.has_threat).count(),
                    threats_total = view.threat_count(),
                    log_events = view.log().len(),
                    tiles = mounted.len(),
                    tiles_offline = offline,
                    "dashboard status"
                );
            }
        }
    }

    tracing::info!("shutting down dashboard");
    for tile in &mut mounted {
        tile.teardown();
    }
    cancel.cancel();
    session.shutdown(SHUTDOWN_TIMEOUT).await;
    if let Some(task) = api_task {
        match task.await {
            Ok(result) => result?,
            Err(e) => tracing::warn!(error = %e, "API task panicked"),
        }
    }
    Ok(())
}

/// Fetch one snapshot and write it to `output`. Returns the detected format.
pub async fn save_snapshot(
    config: &DashboardConfig,
    camera_id: &str,
    output: &std::path::Path,
) -> Result<snapshot::ImageFormat> {
    let source =
        HttpSnapshotSource::new(&config.server.base_url, config.server.request_timeout())?;
    let data = source
        .fetch(camera_id)
        .await
        .with_context(|| format!("failed to fetch snapshot for {}", camera_id))?;
    let frame = snapshot::Frame::new(camera_id, 1, data);
    std::fs::write(output, &frame.data)
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!(
        camera_id,
        bytes = frame.len(),
        format = frame.format.mime(),
        path = %output.display(),
        "snapshot saved"
    );
    Ok(frame.format)
}

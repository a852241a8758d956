//! Read-only JSON API over a running session.

mod routes;
pub mod state;

use anyhow::{Context, Result};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use self::state::ApiState;

/// Build the application router with all API routes.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .fallback(fallback)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::NOT_FOUND, "not found")
}

/// Bind the API listener.
pub async fn bind(bind: &str) -> Result<tokio::net::TcpListener> {
    let addr: std::net::SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid API bind address: {}", bind))?;
    tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", addr))
}

/// Serve the API on an already bound listener until `cancel` fires.
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    state: ApiState,
    cancel: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "dashboard API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    tracing::info!("dashboard API stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tokio::sync::watch;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::aggregate::CameraStateAggregator;
    use crate::event::fixtures::event;
    use crate::roster::{CameraDescriptor, CameraStatus};
    use crate::session::SessionView;
    use crate::stream::{ConnectionState, ThreatCounter};

    fn test_state() -> ApiState {
        let mut aggregator = CameraStateAggregator::default();
        aggregator.ingest(event("cam_1", "weapon_detected", 0));
        aggregator.ingest(event("cam_9", "person_detected", 5));

        let log = vec![
            event("cam_1", "weapon_detected", 0),
            event("cam_9", "person_detected", 5),
        ];
        let threats = ThreatCounter::new();
        threats.record();

        // Receivers keep the last value after their senders drop.
        let (_, cameras) = watch::channel(Arc::new(aggregator.summaries()));
        let (_, log) = watch::channel(Arc::new(log));
        let (_, connection) = watch::channel(ConnectionState::Connected);
        let view = SessionView::new(Uuid::new_v4(), cameras, log, connection, threats);

        let roster = vec![CameraDescriptor {
            id: "cam_1".to_string(),
            name: "Camera 1".to_string(),
            location: "Parking Lot".to_string(),
            status: CameraStatus::Online,
            stream_url: "/stream/cam_1".to_string(),
        }];
        ApiState::new(view, roster)
    }

    async fn get_json(uri: &str) -> (StatusCode, Value) {
        let response = router(test_state())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_reports_connection() {
        let (status, body) = get_json("/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ok");
        assert_eq!(body["data"]["connection"], "connected");
        assert!(body["meta"]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_cameras_joins_roster_and_live_state() {
        let (status, body) = get_json("/api/v1/cameras").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["total"], 2);
        assert_eq!(body["data"][0]["id"], "cam_1");
        assert_eq!(body["data"][0]["status"], "online");
        assert_eq!(body["data"][0]["live"]["has_threat"], true);
        assert_eq!(body["data"][1]["id"], "cam_9");
        assert_eq!(body["data"][1]["live"]["has_activity"], true);
    }

    #[tokio::test]
    async fn test_events_newest_first_with_limit() {
        let (_, body) = get_json("/api/v1/events?limit=1").await;
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["camera_id"], "cam_9");
        assert_eq!(body["meta"]["total"], 2);
    }

    #[tokio::test]
    async fn test_threats_summary() {
        let (_, body) = get_json("/api/v1/threats").await;
        assert_eq!(body["data"]["total_detected"], 1);
        assert_eq!(body["data"]["active_cameras"][0], "cam_1");
        assert_eq!(body["data"]["connection"], "connected");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (status, _) = get_json("/api/v1/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bind_rejects_bad_address() {
        let err = bind("not-an-address").await.unwrap_err();
        assert!(err.to_string().contains("invalid API bind address"));
    }

    #[tokio::test]
    async fn test_bind_fails_when_port_taken() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let err = bind(&addr).await.unwrap_err();
        assert!(err.to_string().contains("failed to bind API listener"));
    }

    #[tokio::test]
    async fn test_serve_on_stops_on_cancel() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(serve_on(listener, test_state(), cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

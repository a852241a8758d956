//! API route definitions.

use axum::extract::{Query, State};
use axum::{routing::get, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::ApiState;

pub fn api_routes() -> Router<ApiState> {
    Router::new()
        .route("/health", get(health))
        .route("/cameras", get(list_cameras))
        .route("/events", get(list_events))
        .route("/threats", get(threats))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "session": state.session.id(),
            "connection": state.session.connection(),
        },
        "meta": meta()
    }))
}

/// Roster entries joined with their live aggregate state. Cameras that are
/// active but missing from the roster are listed after the roster.
async fn list_cameras(State(state): State<ApiState>) -> Json<Value> {
    let summaries = state.session.cameras();
    let mut data: Vec<Value> = state
        .roster
        .iter()
        .map(|camera| {
            let live = summaries.iter().find(|s| s.camera_id == camera.id);
            json!({
                "id": camera.id,
                "name": camera.name,
                "location": camera.location,
                "status": camera.status,
                "live": live,
            })
        })
        .collect();

    data.extend(
        summaries
            .iter()
            .filter(|s| !state.roster.iter().any(|c| c.id == s.camera_id))
            .map(|s| json!({ "id": s.camera_id, "live": s })),
    );

    let total = data.len();
    let mut meta = meta();
    meta["total"] = json!(total);
    Json(json!({ "data": data, "meta": meta }))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
}

/// Visible log, newest first.
async fn list_events(
    State(state): State<ApiState>,
    Query(query): Query<EventsQuery>,
) -> Json<Value> {
    let log = state.session.log();
    let limit = query.limit.unwrap_or(log.len());
    let data: Vec<_> = log.iter().rev().take(limit).collect();

    let mut meta = meta();
    meta["total"] = json!(log.len());
    Json(json!({ "data": data, "meta": meta }))
}

async fn threats(State(state): State<ApiState>) -> Json<Value> {
    let active: Vec<_> = state
        .session
        .cameras()
        .iter()
        .filter(|s| s.has_threat)
        .map(|s| s.camera_id.clone())
        .collect();

    Json(json!({
        "data": {
            "total_detected": state.session.threat_count(),
            "active_cameras": active,
            "connection": state.session.connection(),
        },
        "meta": meta()
    }))
}

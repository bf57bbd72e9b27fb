//! Read-only status API.
//!
//! `GET /api/status` returns every channel snapshot plus tab usage,
//! `GET /api/stats/:id` one channel's counters.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tracing::{info, warn};

use watch_core::fleet::StatusHandle;

#[derive(Clone)]
pub struct ApiState {
    pub status: StatusHandle,
}

async fn get_status(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.status.status().await)
}

async fn get_stats(Path(id): Path<String>, State(state): State<ApiState>) -> Response {
    match state.status.channel_stats(&id).await {
        Some(stats) => Json(stats).into_response(),
        None => (StatusCode::NOT_FOUND, format!("no statistics for {id}")).into_response(),
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/stats/:id", get(get_stats))
        .with_state(state)
}

pub fn start_server(port: u16, state: ApiState) -> tokio::task::JoinHandle<()> {
    let app = router(state);
    tokio::spawn(async move {
        let addr = format!("127.0.0.1:{}", port);
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                warn!("Failed to bind status API on {}: {}", addr, e);
                return;
            }
        };
        info!("Status API listening on http://{}", addr);
        if let Err(e) = axum::serve(listener, app).await {
            warn!("Status API error: {}", e);
        }
    })
}

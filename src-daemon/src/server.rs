//! HTTP front door.
//!
//! - `GET /v1/status` - liveness
//! - `GET /v1/list` - installations of the GitHub App
//! - `POST /v1/scan` - queue a full scan
//! - `GET /v1/report` - summary of the last completed scan

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use valet::hosting::Installation;
use valet::{ScanService, ScanSummary};

use crate::error::{DaemonError, Result};

/// Shared state for the routes.
#[derive(Clone)]
pub struct AppState {
    service: Arc<ScanService>,
    trigger: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(service: Arc<ScanService>, trigger: broadcast::Sender<()>) -> Self {
        Self { service, trigger }
    }
}

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/v1/status", get(status))
        .route("/v1/list", get(list))
        .route("/v1/scan", post(scan))
        .route("/v1/report", get(report))
        .with_state(state);
    with_layers(routes)
}

/// Any origin may call the API. A panicking handler answers 500.
fn with_layers(router: Router) -> Router {
    router
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::new())
}

/// Serves until `shutdown` is cancelled.
pub async fn serve(port: u16, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| DaemonError::Bind { addr, source })?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(DaemonError::Serve)
}

async fn status() -> &'static str {
    "ok"
}

async fn list(
    State(state): State<AppState>,
) -> std::result::Result<Json<Vec<Installation>>, (StatusCode, String)> {
    state
        .service
        .list_installations(&CancellationToken::new())
        .await
        .map(Json)
        .map_err(|e| {
            warn!(error = %e, "Failed to list installations");
            (StatusCode::BAD_GATEWAY, e.to_string())
        })
}

async fn scan(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let already_running = state.service.is_scanning();
    match state.trigger.send(()) {
        Ok(_) => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "queued", "scanInProgress": already_running })),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "scheduler stopped" })),
        ),
    }
}

async fn report(
    State(state): State<AppState>,
) -> std::result::Result<Json<ScanSummary>, StatusCode> {
    state
        .service
        .last_report()
        .await
        .map(|report| Json(report.summary()))
        .ok_or(StatusCode::NOT_FOUND)
}

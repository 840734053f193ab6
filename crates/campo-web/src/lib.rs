//! HTTP surface for triggering program-sheet syncs and reading sync state.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use campo_core::SyncRequest;
use campo_storage::ProgramStore;
use campo_sync::{
    build_orchestrator, connect_store, maybe_build_scheduler, write_run_report, SyncConfig,
    SyncOrchestrator,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "campo-web";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub store: Arc<dyn ProgramStore>,
    /// Where per-run reports are archived; `None` keeps runs in memory only.
    pub reports_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        let store = orchestrator.store();
        Self {
            orchestrator,
            store,
            reports_dir: None,
        }
    }

    pub fn with_reports_dir(mut self, reports_dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = Some(reports_dir.into());
        self
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/sync", post(sync_handler))
        .route("/api/sync/{partition_id}", get(sync_state_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("CAMPO_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let config = SyncConfig::from_env();
    let store = connect_store(&config)?;
    let orchestrator = Arc::new(build_orchestrator(&config, store)?);

    let scheduler = maybe_build_scheduler(config.clone(), orchestrator.clone()).await?;
    if let Some(sched) = &scheduler {
        sched.start().await?;
        info!(cron = %config.sync_cron, "sync scheduler started");
    }

    let state = AppState::new(orchestrator).with_reports_dir(&config.reports_dir);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Always answers 200: run failures travel inside `SyncResult::errors`.
async fn sync_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SyncRequest>,
) -> Response {
    let report = state.orchestrator.run_report(request).await;
    if let Some(dir) = &state.reports_dir {
        if let Err(err) = write_run_report(dir, &report).await {
            warn!(run_id = %report.run_id, error = %err, "could not archive sync report");
        }
    }
    Json(report.result).into_response()
}

async fn sync_state_handler(
    State(state): State<Arc<AppState>>,
    Path(partition_id): Path<String>,
) -> Response {
    match state.store.load_sync_state(&partition_id).await {
        Ok(Some(sync_state)) => Json(sync_state).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            format!("no sync recorded for {partition_id}"),
        )
            .into_response(),
        Err(err) => server_error(err),
    }
}

fn server_error(err: impl std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Server error: {}", err),
    )
        .into_response()
}

//! Operational HTTP API
//!
//! Read-only endpoints for probes and operators; the player-facing query
//! API lives elsewhere and reads the mirror directly.
//!
//! - `GET /health`  liveness
//! - `GET /ready`   store connectivity
//! - `GET /status`  leader state, checkpoint, sync lag, counts
//! - `GET /metrics` counter snapshot (JSON)

use std::sync::Arc;

use arena_db::MirrorStore;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ApiConfig;
use crate::election::LeaderElector;
use crate::error::{SyncError, SyncResult};
use crate::metrics::SyncMetrics;

/// Shared state behind every handler.
pub struct ServerState {
    pub store: Arc<dyn MirrorStore>,
    pub elector: Arc<LeaderElector>,
    pub metrics: Arc<SyncMetrics>,
}

/// Shutdown handle for the HTTP server.
pub struct ServerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

#[derive(Debug, Serialize)]
struct StatusBody {
    instance_id: String,
    leader: bool,
    checkpoint_signature: Option<String>,
    checkpoint_slot: Option<u64>,
    /// Seconds since the checkpoint last moved; None before first tick.
    sync_lag_secs: Option<i64>,
    arenas_total: u64,
    arenas_waiting: u64,
    arenas_active: u64,
    arenas_ended: u64,
    arenas_canceled: u64,
    entries_total: u64,
    transactions_total: u64,
    jobs_queued: u64,
    jobs_running: u64,
    jobs_dead: u64,
    phases_processing: u64,
    phases_failed: u64,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn ready(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    match state.store.stats().await {
        Ok(_) => (StatusCode::OK, Json(json!({ "ready": true }))),
        Err(e) => {
            error!("readiness probe failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "ready": false, "error": e.to_string() })),
            )
        }
    }
}

async fn status(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let stats = match state.store.stats().await {
        Ok(stats) => stats,
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };
    let sync_lag_secs = match state.store.checkpoint().await {
        Ok(Some(checkpoint)) => Some((Utc::now() - checkpoint.updated_at).num_seconds()),
        _ => None,
    };

    let body = StatusBody {
        instance_id: state.elector.instance_id().to_string(),
        leader: state.elector.is_leader(),
        checkpoint_signature: stats.checkpoint_signature.clone(),
        checkpoint_slot: stats.checkpoint_slot,
        sync_lag_secs,
        arenas_total: stats.arenas_total,
        arenas_waiting: stats.arenas_waiting,
        arenas_active: stats.arenas_active,
        arenas_ended: stats.arenas_ended,
        arenas_canceled: stats.arenas_canceled,
        entries_total: stats.entries_total,
        transactions_total: stats.transactions_total,
        jobs_queued: stats.jobs_queued,
        jobs_running: stats.jobs_running,
        jobs_dead: stats.jobs_dead,
        phases_processing: stats.phases_processing,
        phases_failed: stats.phases_failed,
    };
    Json(body).into_response()
}

async fn metrics(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Bind and serve the ops API until the handle is stopped.
pub async fn start(config: &ApiConfig, state: Arc<ServerState>) -> SyncResult<ServerHandle> {
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .map_err(|e| SyncError::Config(format!("bind {}: {e}", config.bind)))?;
    info!("ops API listening on {}", config.bind);

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let app = router(state);

    let task = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.recv().await;
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("ops API server error: {}", e);
        }
        info!("ops API stopped");
    });

    Ok(ServerHandle { shutdown_tx, task })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ElectionConfig;
    use crate::election::MemoryLockStore;
    use arena_core::ArenaStatus;
    use arena_db::{ArenaRow, MemoryStore};

    async fn state() -> Arc<ServerState> {
        let store = Arc::new(MemoryStore::new());
        let elector = Arc::new(LeaderElector::new(
            Arc::new(MemoryLockStore::new()),
            ElectionConfig {
                instance_id: "test-instance".to_string(),
                ..ElectionConfig::default()
            },
            Arc::new(SyncMetrics::new()),
        ));
        Arc::new(ServerState {
            store,
            elector,
            metrics: Arc::new(SyncMetrics::new()),
        })
    }

    #[tokio::test]
    async fn ready_reports_store_health() {
        let state = state().await;
        let response = ready(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_carries_leadership_and_counts() {
        let state = state().await;
        state
            .store
            .upsert_arena(&{
                let mut row = ArenaRow::shell(1, "addr-1", 1_000_000, 4);
                row.status = ArenaStatus::Active;
                row
            })
            .await
            .unwrap();
        state.elector.try_acquire_once().await.unwrap();

        let response = status(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["instance_id"], "test-instance");
        assert_eq!(body["leader"], true);
        assert_eq!(body["arenas_total"], 1);
        assert_eq!(body["arenas_active"], 1);
        assert!(body["checkpoint_signature"].is_null());
    }

    #[tokio::test]
    async fn metrics_snapshot_serializes() {
        let state = state().await;
        state.metrics.transaction_indexed();
        let response = metrics(State(state)).await.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["transactions_indexed"], 1);
    }
}

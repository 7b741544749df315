//! aegis-fe library interface
//!
//! Feedback classification service: races a deterministic heuristic against
//! an AI completion backend under a hard deadline, persists one record per
//! distinct text, and heals fallback results in the background.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use aegis_common::EngineParams;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::FeedbackStore;
use crate::services::{
    spawn_reconciler, CompletionClient, IngestService, Normalizer, RaceArbiter, ReconcileHandle, Reconciler,
    WebhookAlerter,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: FeedbackStore,
    pub ingest: IngestService,
    pub reconcile: ReconcileHandle,
    pub ai_provider: String,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last server-side error, reported by /health
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Record server-side failures before handing the result back
    pub async fn track<T>(&self, result: ApiResult<T>) -> ApiResult<T> {
        if let Err(ref err) = result {
            if err.is_server_error() {
                tracing::error!(error = %err, "Request failed");
                *self.last_error.write().await = Some(err.to_string());
            }
        }
        result
    }
}

/// Wire the classification engine and start its reconciliation worker
///
/// The worker stops when `cancel` fires; await the returned handle to wait
/// for it.
pub fn start_engine(
    pool: SqlitePool,
    params: &EngineParams,
    ai: Arc<dyn CompletionClient>,
    alerter: WebhookAlerter,
    cancel: CancellationToken,
) -> (AppState, JoinHandle<()>) {
    let store = FeedbackStore::new(pool);
    let ai_provider = ai.provider().to_string();

    let ingest = IngestService::new(
        Normalizer::new(params.min_length, params.max_length),
        store.clone(),
        RaceArbiter::new(Arc::clone(&ai), params.race_deadline),
        alerter,
    );

    let reconciler = Reconciler::new(
        store.clone(),
        ai,
        params.reconcile_batch_size,
        params.reconcile_concurrency,
        params.reconcile_timeout,
    );
    let (reconcile, worker) = spawn_reconciler(reconciler, params.reconcile_interval, cancel);

    let state = AppState {
        store,
        ingest,
        reconcile,
        ai_provider,
        startup_time: Utc::now(),
        last_error: Arc::new(RwLock::new(None)),
    };
    (state, worker)
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::feedback_routes())
        .merge(api::admin_routes())
        .merge(api::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

//! songboard library
//!
//! Content-planning backend: a local library of artists, albums and tracks
//! imported from the iTunes catalog, with workflow statuses, post logs and
//! playlists. This library exposes modules for use in integration tests.

use axum::{response::Json, routing::get, Router};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;

use config::Config;
use services::{CatalogClient, Importer, JobContext, SyncService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<Mutex<Connection>>,
    pub catalog: Arc<CatalogClient>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: Config, conn: Connection, catalog: Arc<CatalogClient>) -> Self {
        Self {
            config: Arc::new(config),
            db: Arc::new(Mutex::new(conn)),
            catalog,
            start_time: std::time::Instant::now(),
        }
    }

    /// Importer bound to this state's store and catalog.
    pub fn importer(&self) -> Importer {
        Importer::new(
            Arc::clone(&self.db),
            Arc::clone(&self.catalog),
            self.config.sync.track_batch_size,
        )
    }

    pub fn sync_service(&self) -> SyncService {
        SyncService::new(
            Arc::clone(&self.db),
            Arc::clone(&self.catalog),
            self.config.sync.clone(),
        )
    }

    /// Create a job context for scheduled jobs.
    pub fn job_context(&self) -> JobContext {
        JobContext {
            sync: self.sync_service(),
        }
    }
}

/// Builds the complete application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub message: String,
    pub version: String,
    pub catalog: String,
    pub uptime_secs: u64,
}

pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "songboard is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        catalog: state.catalog.provider_name().to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

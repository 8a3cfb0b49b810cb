//! mflow-ci library interface
//!
//! Exposes the ingestion pipeline and router for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::services::harvester::{CycleSummary, HarvestParams, Harvester};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Harvest orchestrator; None when no API token is configured
    pub harvester: Option<Arc<Harvester>>,
    /// Configured harvest parameters (request fields override per cycle)
    pub harvest_defaults: HarvestParams,
    /// Guard ensuring a single harvest cycle at a time
    pub harvest_running: Arc<AtomicBool>,
    /// Summary of the last completed cycle
    pub last_cycle: Arc<RwLock<Option<CycleSummary>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        harvester: Option<Arc<Harvester>>,
        harvest_defaults: HarvestParams,
    ) -> Self {
        Self {
            db,
            harvester,
            harvest_defaults,
            harvest_running: Arc::new(AtomicBool::new(false)),
            last_cycle: Arc::new(RwLock::new(None)),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::ingest_routes())
        .merge(api::harvest_routes())
        .merge(api::health_routes())
        .with_state(state)
}

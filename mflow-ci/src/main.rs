//! mflow-ci - Content Ingest Service
//!
//! Ingests content snapshots (notes, authors, comments, topic metrics)
//! from the external content-discovery workflow API and reconciles them
//! into the shared SQLite store. Exposes the push-ingestion entry points
//! plus the harvest orchestration controls over HTTP.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use mflow_ci::services::{Harvester, WorkflowClient};
use mflow_ci::{config, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting mflow-ci (Content Ingest) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve configuration (ENV -> TOML -> defaults)
    let settings = config::resolve_settings(None)
        .map_err(|e| anyhow::anyhow!("Failed to resolve configuration: {}", e))?;

    std::fs::create_dir_all(&settings.data_dir)?;
    info!("Data folder: {}", settings.data_dir.display());
    info!("Database: {}", settings.db_path.display());

    // Initialize database connection pool
    let db_pool = mflow_ci::db::init_database_pool(&settings.db_path).await?;
    info!("Database connection established");

    // Initialize the workflow client and harvester when a token is present
    let harvester = match settings.client.clone() {
        Some(client_config) => match WorkflowClient::new(client_config) {
            Ok(client) => {
                info!("Workflow client initialized");
                Some(Arc::new(Harvester::new(db_pool.clone(), Arc::new(client))))
            }
            Err(e) => {
                warn!("Failed to initialize workflow client: {}; harvesting disabled", e);
                None
            }
        },
        None => {
            warn!("Workflow API token not configured; harvesting disabled");
            None
        }
    };

    // Create application state and router
    let state = AppState::new(db_pool, harvester, settings.harvest.clone());
    let app = mflow_ci::build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", settings.listen_port)).await?;
    info!("Listening on http://127.0.0.1:{}", settings.listen_port);
    info!("Health check: http://127.0.0.1:{}/health", settings.listen_port);

    axum::serve(listener, app).await?;

    Ok(())
}

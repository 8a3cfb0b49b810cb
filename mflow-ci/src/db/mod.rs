//! Database access for mflow-ci
//!
//! SQLite store holding the reconciled content entities. All write paths
//! run inside per-batch transactions opened by the reconciliation engine.

pub mod authors;
pub mod comments;
pub mod keyword_groups;
pub mod note_details;
pub mod notes;
pub mod schema;
pub mod topics;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

/// Initialize database connection pool
///
/// Opens (or creates) the store at `db_path`, enables foreign keys and
/// WAL on every pooled connection, and creates missing tables.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    schema::initialize_schema(&pool).await?;

    tracing::info!("Database ready: {}", db_path.display());

    Ok(pool)
}

/// Placeholder list for dynamic `IN (...)` clauses
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    use std::str::FromStr;

    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("memory options")
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to create in-memory database");

    schema::initialize_schema(&pool)
        .await
        .expect("Schema initialization failed");

    pool
}

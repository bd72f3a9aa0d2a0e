//! SQLite database connection management.
//!
//! Provides a connection pool to the SQLite database with WAL mode and
//! foreign keys enabled. The database file and its parent directories are
//! created automatically if they don't exist.
//!
//! # Write-Ahead Logging (WAL)
//!
//! WAL mode lets the HTTP handlers read person and image views while a
//! reassignment transaction is writing. Writers are serialized by
//! [`SqliteStore`](crate::store::sqlite::SqliteStore) itself; the busy
//! timeout covers other processes (e.g. `facesort import`) holding the lock.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

/// Create a connection pool to the configured SQLite database.
///
/// # Errors
///
/// Returns an error if the database cannot be created or connected to.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5))
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

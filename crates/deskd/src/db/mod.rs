//! SQLite plumbing for the session store.
//!
//! The controller pass and the sweeper are the only writers and they
//! never overlap on a session, so a small WAL pool with a generous busy
//! timeout covers all contention this daemon can produce.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

/// Handle to the session database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the session database at `path` and bring its
    /// schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        // One connection per periodic task is all deskd ever needs.
        Self::connect(options, 2).await
    }

    /// In-memory database for tests. Single connection, or each pool
    /// checkout would see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        Self::connect(SqliteConnectOptions::new().in_memory(true), 1).await
    }

    async fn connect(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("opening session database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("migrating session database")?;

        Ok(Self { pool })
    }

    /// Connection pool for the session repository.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

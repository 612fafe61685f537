// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use kiosk_core::KioskError;
use tracing::debug;

use crate::migrations;

/// Convert a tokio-rusqlite error into KioskError::Storage.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> KioskError {
    KioskError::Storage {
        source: Box::new(e),
    }
}

/// Current UTC timestamp in the ISO 8601 millisecond format used across
/// every table.
pub fn now_iso() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Handle to the SQLite database behind a tokio-rusqlite connection.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs and run
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, KioskError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(map_tr_err)?;
        Self::setup(conn).await
    }

    /// Open an in-memory database with the full schema. Test-oriented, but
    /// also useful for ephemeral tooling.
    pub async fn open_in_memory() -> Result<Self, KioskError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(map_tr_err)?;
        Self::setup(conn).await
    }

    async fn setup(conn: tokio_rusqlite::Connection) -> Result<Self, KioskError> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            migrations::run(conn)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
        debug!("database ready");
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Flush the WAL into the main database file. Called on shutdown.
    pub async fn close(&self) -> Result<(), KioskError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_file_and_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kiosk.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        assert!(path.exists());

        // The schema must be queryable.
        let count: i64 = db
            .connection()
            .call(|conn| {
                let n = conn.query_row("SELECT COUNT(*) FROM leads", [], |row| row.get(0))?;
                Ok(n)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_is_idempotent_across_restarts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kiosk.db");
        {
            let db = Database::open(path.to_str().unwrap()).await.unwrap();
            db.close().await.unwrap();
        }
        // Second open must not fail re-running migrations.
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();
    }

    #[test]
    fn now_iso_has_millisecond_precision() {
        let ts = now_iso();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2026-01-01T00:00:00.000Z".len());
    }
}

// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Catalog version bookkeeping for blue-green index builds.
//!
//! A partial unique index on `status = 'active'` backs the at-most-one
//! active version invariant; the building→active transition demotes the
//! previous active row in the same transaction.

use kiosk_core::{CatalogVersion, KioskError, VersionStatus};
use rusqlite::params;

use crate::database::{map_tr_err, now_iso, Database};

const VERSION_COLUMNS: &str =
    "version_name, status, total_rows, indexed_rows, created_at, activated_at";

fn row_to_version(row: &rusqlite::Row) -> rusqlite::Result<CatalogVersion> {
    let status: String = row.get(1)?;
    Ok(CatalogVersion {
        version_name: row.get(0)?,
        status: status.parse().unwrap_or(VersionStatus::Failed),
        total_rows: row.get(2)?,
        indexed_rows: row.get(3)?,
        created_at: row.get(4)?,
        activated_at: row.get(5)?,
    })
}

/// Register a new build in `building` state.
pub async fn create_version(
    db: &Database,
    version_name: &str,
    total_rows: i64,
) -> Result<CatalogVersion, KioskError> {
    let version_name = version_name.to_string();
    let created_at = now_iso();
    let stored = CatalogVersion {
        version_name: version_name.clone(),
        status: VersionStatus::Building,
        total_rows,
        indexed_rows: 0,
        created_at: created_at.clone(),
        activated_at: None,
    };
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO catalog_versions (version_name, status, total_rows, indexed_rows, created_at)
                 VALUES (?1, 'building', ?2, 0, ?3)",
                params![version_name, total_rows, created_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    Ok(stored)
}

/// Update build progress so operators can observe it.
pub async fn update_progress(
    db: &Database,
    version_name: &str,
    indexed_rows: i64,
) -> Result<(), KioskError> {
    let version_name = version_name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE catalog_versions SET indexed_rows = ?2 WHERE version_name = ?1",
                params![version_name, indexed_rows],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Atomic building→active transition. The previous active version (if any)
/// is demoted to superseded in the same transaction; its name is returned
/// so the caller can schedule directory garbage collection.
pub async fn activate_version(
    db: &Database,
    version_name: &str,
) -> Result<Option<String>, KioskError> {
    let version_name = version_name.to_string();
    let activated_at = now_iso();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let previous: Option<String> = {
                let mut stmt = tx.prepare(
                    "SELECT version_name FROM catalog_versions WHERE status = 'active' LIMIT 1",
                )?;
                let mut rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                rows.next().transpose()?
            };
            if let Some(prev) = &previous {
                tx.execute(
                    "UPDATE catalog_versions SET status = 'superseded' WHERE version_name = ?1",
                    params![prev],
                )?;
            }
            tx.execute(
                "UPDATE catalog_versions SET status = 'active', activated_at = ?2
                 WHERE version_name = ?1 AND status = 'building'",
                params![version_name, activated_at],
            )?;
            tx.commit()?;
            Ok(previous)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a build as failed.
pub async fn mark_failed(db: &Database, version_name: &str) -> Result<(), KioskError> {
    let version_name = version_name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE catalog_versions SET status = 'failed' WHERE version_name = ?1",
                params![version_name],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The currently active version, if any.
pub async fn active_version(db: &Database) -> Result<Option<CatalogVersion>, KioskError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VERSION_COLUMNS} FROM catalog_versions WHERE status = 'active' LIMIT 1"
            ))?;
            let mut rows = stmt.query_map([], row_to_version)?;
            Ok(rows.next().transpose()?)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_version(
    db: &Database,
    version_name: &str,
) -> Result<Option<CatalogVersion>, KioskError> {
    let version_name = version_name.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VERSION_COLUMNS} FROM catalog_versions WHERE version_name = ?1"
            ))?;
            let mut rows = stmt.query_map(params![version_name], row_to_version)?;
            Ok(rows.next().transpose()?)
        })
        .await
        .map_err(map_tr_err)
}

/// Superseded versions older than `cutoff`, eligible for directory GC.
pub async fn superseded_before(
    db: &Database,
    cutoff: &str,
) -> Result<Vec<CatalogVersion>, KioskError> {
    let cutoff = cutoff.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VERSION_COLUMNS} FROM catalog_versions
                 WHERE status = 'superseded' AND activated_at IS NOT NULL AND activated_at <= ?1"
            ))?;
            let versions = stmt
                .query_map(params![cutoff], row_to_version)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(versions)
        })
        .await
        .map_err(map_tr_err)
}

/// Remove a version row after its directory has been collected.
pub async fn delete_version(db: &Database, version_name: &str) -> Result<(), KioskError> {
    let version_name = version_name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM catalog_versions WHERE version_name = ?1",
                params![version_name],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

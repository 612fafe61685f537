// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable log rows for WARNING/ERROR/CRITICAL/BUSINESS events.

use kiosk_core::KioskError;
use rusqlite::params;

use crate::database::{map_tr_err, now_iso, Database};

/// Append a log row.
pub async fn insert_log(
    db: &Database,
    level: &str,
    message: &str,
    metadata: Option<String>,
) -> Result<(), KioskError> {
    let level = level.to_string();
    let message = message.to_string();
    let created_at = now_iso();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO system_logs (level, message, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![level, message, metadata, created_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The most recent rows at a level, newest first. Used by diagnostics and
/// tests.
pub async fn recent_logs(
    db: &Database,
    level: &str,
    limit: usize,
) -> Result<Vec<(String, Option<String>)>, KioskError> {
    let level = level.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT message, metadata FROM system_logs
                 WHERE level = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )?;
            let logs = stmt
                .query_map(params![level, limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(logs)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rows_filtered_by_level() {
        let db = Database::open_in_memory().await.unwrap();
        insert_log(&db, "ERROR", "boom", None).await.unwrap();
        insert_log(&db, "BUSINESS", "lead created", Some(r#"{"lead_id":"l1"}"#.into()))
            .await
            .unwrap();

        let errors = recent_logs(&db, "ERROR", 10).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "boom");

        let business = recent_logs(&db, "BUSINESS", 10).await.unwrap();
        assert_eq!(business.len(), 1);
        assert!(business[0].1.as_deref().unwrap().contains("l1"));
    }
}

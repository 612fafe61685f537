// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM provider selection rows. At most one provider is active; the switch
//! is a single transaction so the gateway can reload at any moment.

use kiosk_core::KioskError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

/// The active provider id and its JSON config blob, if any.
pub async fn active_provider(db: &Database) -> Result<Option<(String, String)>, KioskError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT provider_id, config FROM llm_settings WHERE is_active = 1 LIMIT 1",
            )?;
            let mut rows =
                stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
            Ok(rows.next().transpose()?)
        })
        .await
        .map_err(map_tr_err)
}

/// Make `provider_id` the single active provider.
pub async fn set_active_provider(
    db: &Database,
    provider_id: &str,
    config: &str,
) -> Result<(), KioskError> {
    let provider_id = provider_id.to_string();
    let config = config.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("UPDATE llm_settings SET is_active = 0 WHERE is_active = 1", [])?;
            tx.execute(
                "INSERT INTO llm_settings (provider_id, config, is_active) VALUES (?1, ?2, 1)
                 ON CONFLICT(provider_id) DO UPDATE SET config = excluded.config, is_active = 1",
                params![provider_id, config],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_active_provider_initially() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(active_provider(&db).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn switching_deactivates_previous() {
        let db = Database::open_in_memory().await.unwrap();
        set_active_provider(&db, "openai", "{}").await.unwrap();
        set_active_provider(&db, "yandex", r#"{"folder":"b1"}"#)
            .await
            .unwrap();

        let (provider, config) = active_provider(&db).await.unwrap().unwrap();
        assert_eq!(provider, "yandex");
        assert!(config.contains("b1"));

        let active_count: i64 = db
            .connection()
            .call(|conn| {
                let n = conn.query_row(
                    "SELECT COUNT(*) FROM llm_settings WHERE is_active = 1",
                    [],
                    |row| row.get(0),
                )?;
                Ok(n)
            })
            .await
            .unwrap();
        assert_eq!(active_count, 1);
    }
}

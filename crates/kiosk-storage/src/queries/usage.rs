// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Monthly token usage rollups. Only the rollup row is mutable.

use kiosk_core::{KioskError, UsageRecord};
use rusqlite::params;

use crate::database::{map_tr_err, Database};

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<UsageRecord> {
    Ok(UsageRecord {
        provider: row.get(0)?,
        model: row.get(1)?,
        year: row.get(2)?,
        month: row.get(3)?,
        total_tokens: row.get(4)?,
        price_per_1k: row.get(5)?,
        currency: row.get(6)?,
    })
}

const USAGE_COLUMNS: &str = "provider, model, year, month, total_tokens, price_per_1k, currency";

/// Add `tokens` to the `(provider, model, year, month)` rollup, creating the
/// row on first use. The per-1k price is refreshed so later price changes
/// apply going forward.
pub async fn record_usage(
    db: &Database,
    provider: &str,
    model: &str,
    year: i32,
    month: u32,
    tokens: i64,
    price_per_1k: f64,
) -> Result<(), KioskError> {
    let provider = provider.to_string();
    let model = model.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO usage_statistics (provider, model, year, month, total_tokens, price_per_1k)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(provider, model, year, month) DO UPDATE SET
                     total_tokens = total_tokens + excluded.total_tokens,
                     price_per_1k = excluded.price_per_1k",
                params![provider, model, year, month, tokens, price_per_1k],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All rollup rows for one month.
pub async fn monthly_summary(
    db: &Database,
    year: i32,
    month: u32,
) -> Result<Vec<UsageRecord>, KioskError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USAGE_COLUMNS} FROM usage_statistics
                 WHERE year = ?1 AND month = ?2 ORDER BY provider, model"
            ))?;
            let records = stmt
                .query_map(params![year, month], row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn usage_accumulates_per_rollup_key() {
        let db = Database::open_in_memory().await.unwrap();
        record_usage(&db, "openai", "gpt-4o-mini", 2026, 3, 1000, 0.00015)
            .await
            .unwrap();
        record_usage(&db, "openai", "gpt-4o-mini", 2026, 3, 500, 0.00015)
            .await
            .unwrap();
        record_usage(&db, "yandex", "yandexgpt-lite", 2026, 3, 200, 0.0002)
            .await
            .unwrap();

        let summary = monthly_summary(&db, 2026, 3).await.unwrap();
        assert_eq!(summary.len(), 2);
        let openai = summary.iter().find(|r| r.provider == "openai").unwrap();
        assert_eq!(openai.total_tokens, 1500);
    }

    #[tokio::test]
    async fn months_are_isolated() {
        let db = Database::open_in_memory().await.unwrap();
        record_usage(&db, "openai", "gpt-4o-mini", 2026, 3, 1000, 0.00015)
            .await
            .unwrap();
        record_usage(&db, "openai", "gpt-4o-mini", 2026, 4, 700, 0.00015)
            .await
            .unwrap();

        let march = monthly_summary(&db, 2026, 3).await.unwrap();
        assert_eq!(march[0].total_tokens, 1000);
        let april = monthly_summary(&db, 2026, 4).await.unwrap();
        assert_eq!(april[0].total_tokens, 700);
    }
}

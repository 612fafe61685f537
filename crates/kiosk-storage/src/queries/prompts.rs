// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Versioned prompt rows. Per name, exactly one version is active; the
//! flip happens inside a single transaction so readers never observe zero
//! or two active versions.

use kiosk_core::{KioskError, Prompt, Role};
use rusqlite::params;

use crate::database::{map_tr_err, now_iso, Database};

fn row_to_prompt(row: &rusqlite::Row) -> rusqlite::Result<Prompt> {
    let role: String = row.get(4)?;
    Ok(Prompt {
        name: row.get(0)?,
        content: row.get(1)?,
        version: row.get(2)?,
        active: row.get(3)?,
        role: Role::from_str_value(&role),
    })
}

const PROMPT_COLUMNS: &str = "name, content, version, active, role";

/// The active version of a named prompt.
pub async fn get_active(db: &Database, name: &str) -> Result<Option<Prompt>, KioskError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROMPT_COLUMNS} FROM prompts WHERE name = ?1 AND active = 1"
            ))?;
            let mut rows = stmt.query_map(params![name], row_to_prompt)?;
            Ok(rows.next().transpose()?)
        })
        .await
        .map_err(map_tr_err)
}

/// All active prompts, used to warm the registry cache.
pub async fn list_active(db: &Database) -> Result<Vec<Prompt>, KioskError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROMPT_COLUMNS} FROM prompts WHERE active = 1 ORDER BY name"
            ))?;
            let prompts = stmt
                .query_map([], row_to_prompt)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(prompts)
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a new version of `name` and atomically make it the active one.
/// Returns the stored prompt.
pub async fn put(
    db: &Database,
    name: &str,
    content: &str,
    role: Role,
) -> Result<Prompt, KioskError> {
    let name = name.to_string();
    let content = content.to_string();
    let created_at = now_iso();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let next_version: i64 = tx.query_row(
                "SELECT COALESCE(MAX(version), 0) + 1 FROM prompts WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )?;
            tx.execute(
                "UPDATE prompts SET active = 0 WHERE name = ?1 AND active = 1",
                params![name],
            )?;
            tx.execute(
                "INSERT INTO prompts (name, content, version, active, role, created_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5)",
                params![name, content, next_version, role.to_string(), created_at],
            )?;
            tx.commit()?;
            Ok(Prompt {
                name,
                content,
                version: next_version,
                active: true,
                role,
            })
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_creates_version_one() {
        let db = Database::open_in_memory().await.unwrap();
        let prompt = put(&db, "system_prompt", "be helpful", Role::System)
            .await
            .unwrap();
        assert_eq!(prompt.version, 1);
        assert!(prompt.active);
    }

    #[tokio::test]
    async fn activation_supersedes_previous_version() {
        let db = Database::open_in_memory().await.unwrap();
        put(&db, "system_prompt", "v1 text", Role::System)
            .await
            .unwrap();
        let v2 = put(&db, "system_prompt", "v2 text", Role::System)
            .await
            .unwrap();
        assert_eq!(v2.version, 2);

        let active = get_active(&db, "system_prompt").await.unwrap().unwrap();
        assert_eq!(active.version, 2);
        assert_eq!(active.content, "v2 text");

        // Exactly one active row exists at any point.
        let count: i64 = db
            .connection()
            .call(|conn| {
                let n = conn.query_row(
                    "SELECT COUNT(*) FROM prompts WHERE name = 'system_prompt' AND active = 1",
                    [],
                    |row| row.get(0),
                )?;
                Ok(n)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn names_are_independent() {
        let db = Database::open_in_memory().await.unwrap();
        put(&db, "system_prompt", "a", Role::System).await.unwrap();
        put(&db, "product_search", "b", Role::System).await.unwrap();

        let all = list_active(&db).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn unknown_name_returns_none() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(get_active(&db, "missing").await.unwrap().is_none());
    }
}

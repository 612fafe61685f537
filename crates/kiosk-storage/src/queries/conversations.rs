// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation lifecycle. A user has at most one open conversation.

use kiosk_core::{Conversation, KioskError};
use rusqlite::params;

use crate::database::{map_tr_err, now_iso, Database};

const CONV_COLUMNS: &str = "id, chat_id, platform, status, started_at, ended_at, metadata";

fn row_to_conversation(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        platform: row.get(2)?,
        status: row.get(3)?,
        started_at: row.get(4)?,
        ended_at: row.get(5)?,
        metadata: row.get(6)?,
    })
}

/// Return the user's open conversation, opening a new one if none exists.
pub async fn open_or_get(
    db: &Database,
    chat_id: &str,
    platform: &str,
) -> Result<Conversation, KioskError> {
    let chat_id = chat_id.to_string();
    let platform = platform.to_string();
    let new_id = uuid::Uuid::new_v4().to_string();
    let started_at = now_iso();

    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let existing = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {CONV_COLUMNS} FROM conversations
                     WHERE chat_id = ?1 AND status = 'open'
                     ORDER BY started_at DESC LIMIT 1"
                ))?;
                let mut rows = stmt.query_map(params![chat_id], row_to_conversation)?;
                rows.next().transpose()?
            };
            let conversation = match existing {
                Some(conv) => conv,
                None => {
                    tx.execute(
                        "INSERT INTO conversations (id, chat_id, platform, status, started_at)
                         VALUES (?1, ?2, ?3, 'open', ?4)",
                        params![new_id, chat_id, platform, started_at],
                    )?;
                    Conversation {
                        id: new_id.clone(),
                        chat_id: chat_id.clone(),
                        platform: platform.clone(),
                        status: "open".to_string(),
                        started_at: started_at.clone(),
                        ended_at: None,
                        metadata: None,
                    }
                }
            };
            tx.commit()?;
            Ok(conversation)
        })
        .await
        .map_err(map_tr_err)
}

/// Close a conversation, stamping `ended_at`.
pub async fn end_conversation(db: &Database, conversation_id: &str) -> Result<(), KioskError> {
    let conversation_id = conversation_id.to_string();
    let ended_at = now_iso();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET status = 'ended', ended_at = ?2 WHERE id = ?1",
                params![conversation_id, ended_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All open conversations; the inactivity monitor scans these.
pub async fn list_open(db: &Database) -> Result<Vec<Conversation>, KioskError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONV_COLUMNS} FROM conversations WHERE status = 'open'"
            ))?;
            let conversations = stmt
                .query_map([], row_to_conversation)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(conversations)
        })
        .await
        .map_err(map_tr_err)
}

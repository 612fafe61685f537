// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only message log.
//!
//! Ordering within a conversation is (created_at, rowid): timestamps carry
//! millisecond precision and appends on one conversation are serialized by
//! the conversation store, so rowid only breaks exact-millisecond ties.

use kiosk_core::{KioskError, Message, Role};
use rusqlite::params;

use crate::database::{map_tr_err, now_iso, Database};

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let role: String = row.get(2)?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: Role::from_str_value(&role),
        content: row.get(3)?,
        metadata: row.get(4)?,
        created_at: row.get(5)?,
    })
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, metadata, created_at";

/// Append a message and return the stored row.
pub async fn append_message(
    db: &Database,
    conversation_id: &str,
    role: Role,
    content: &str,
    metadata: Option<String>,
) -> Result<Message, KioskError> {
    let message = Message {
        id: uuid::Uuid::new_v4().to_string(),
        conversation_id: conversation_id.to_string(),
        role,
        content: content.to_string(),
        metadata,
        created_at: now_iso(),
    };
    let stored = message.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    message.id,
                    message.conversation_id,
                    message.role.to_string(),
                    message.content,
                    message.metadata,
                    message.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    Ok(stored)
}

/// The last `limit` messages of a conversation in chronological order.
pub async fn recent_window(
    db: &Database,
    conversation_id: &str,
    limit: usize,
) -> Result<Vec<Message>, KioskError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2"
            ))?;
            let mut messages = stmt
                .query_map(params![conversation_id, limit as i64], row_to_message)?
                .collect::<Result<Vec<_>, _>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// Every message of a conversation in chronological order.
pub async fn all_messages(
    db: &Database,
    conversation_id: &str,
) -> Result<Vec<Message>, KioskError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let messages = stmt
                .query_map(params![conversation_id], row_to_message)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// Timestamp of the user's most recent message across all their
/// conversations. Drives the inactivity monitor.
pub async fn latest_activity(db: &Database, chat_id: &str) -> Result<Option<String>, KioskError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let latest: Option<String> = conn.query_row(
                "SELECT MAX(m.created_at) FROM messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE c.chat_id = ?1",
                params![chat_id],
                |row| row.get(0),
            )?;
            Ok(latest)
        })
        .await
        .map_err(map_tr_err)
}

/// Intent tags recorded on a conversation's messages since `since`.
///
/// Metadata is a JSON blob with an optional "intent" field; rows without
/// one are skipped.
pub async fn intents_since(
    db: &Database,
    conversation_id: &str,
    since: &str,
) -> Result<Vec<String>, KioskError> {
    let conversation_id = conversation_id.to_string();
    let since = since.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT json_extract(metadata, '$.intent') FROM messages
                 WHERE conversation_id = ?1 AND created_at >= ?2 AND metadata IS NOT NULL",
            )?;
            let intents = stmt
                .query_map(params![conversation_id, since], |row| {
                    row.get::<_, Option<String>>(0)
                })?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .flatten()
                .collect();
            Ok(intents)
        })
        .await
        .map_err(map_tr_err)
}

// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User rows keyed by the platform-agnostic chat_id.

use kiosk_core::{KioskError, User};
use rusqlite::params;

use crate::database::{map_tr_err, now_iso, Database};

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        username: row.get(4)?,
        phone: row.get(5)?,
        email: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const USER_COLUMNS: &str = "id, chat_id, first_name, last_name, username, phone, email, created_at";

/// Fetch a user by chat_id.
pub async fn get_user(db: &Database, chat_id: &str) -> Result<Option<User>, KioskError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE chat_id = ?1"
            ))?;
            let mut rows = stmt.query_map(params![chat_id], row_to_user)?;
            Ok(rows.next().transpose()?)
        })
        .await
        .map_err(map_tr_err)
}

/// Create the user on first inbound message, or refresh the display name
/// parts on subsequent ones. Returns the stored row.
pub async fn upsert_user(
    db: &Database,
    chat_id: &str,
    first_name: Option<&str>,
    last_name: Option<&str>,
    username: Option<&str>,
) -> Result<User, KioskError> {
    let chat_id = chat_id.to_string();
    let first_name = first_name.map(String::from);
    let last_name = last_name.map(String::from);
    let username = username.map(String::from);
    let id = uuid::Uuid::new_v4().to_string();
    let created_at = now_iso();

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO users (id, chat_id, first_name, last_name, username, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(chat_id) DO UPDATE SET
                     first_name = COALESCE(excluded.first_name, first_name),
                     last_name = COALESCE(excluded.last_name, last_name),
                     username = COALESCE(excluded.username, username)",
                params![id, chat_id, first_name, last_name, username, created_at],
            )?;
            let user = conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE chat_id = ?1"),
                params![chat_id],
                row_to_user,
            )?;
            Ok(user)
        })
        .await
        .map_err(map_tr_err)
}

/// Store contact fields learned during lead qualification.
pub async fn update_contact(
    db: &Database,
    chat_id: &str,
    phone: Option<&str>,
    email: Option<&str>,
) -> Result<(), KioskError> {
    let chat_id = chat_id.to_string();
    let phone = phone.map(String::from);
    let email = email.map(String::from);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE users SET
                     phone = COALESCE(?2, phone),
                     email = COALESCE(?3, email)
                 WHERE chat_id = ?1",
                params![chat_id, phone, email],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_creates_then_refreshes() {
        let db = Database::open_in_memory().await.unwrap();

        let created = upsert_user(&db, "chat-1", Some("Ivan"), None, None)
            .await
            .unwrap();
        assert_eq!(created.chat_id, "chat-1");
        assert_eq!(created.first_name.as_deref(), Some("Ivan"));

        let updated = upsert_user(&db, "chat-1", Some("Ivan"), Some("Ivanov"), Some("ivan"))
            .await
            .unwrap();
        assert_eq!(updated.id, created.id, "chat_id is the stable handle");
        assert_eq!(updated.last_name.as_deref(), Some("Ivanov"));
    }

    #[tokio::test]
    async fn contact_fields_merge_without_clobbering() {
        let db = Database::open_in_memory().await.unwrap();
        upsert_user(&db, "chat-1", None, None, None).await.unwrap();

        update_contact(&db, "chat-1", Some("+79001234567"), None)
            .await
            .unwrap();
        update_contact(&db, "chat-1", None, Some("ivan@example.com"))
            .await
            .unwrap();

        let user = get_user(&db, "chat-1").await.unwrap().unwrap();
        assert_eq!(user.phone.as_deref(), Some("+79001234567"));
        assert_eq!(user.email.as_deref(), Some("ivan@example.com"));
    }

    #[tokio::test]
    async fn get_missing_user_is_none() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(get_user(&db, "nobody").await.unwrap().is_none());
    }
}

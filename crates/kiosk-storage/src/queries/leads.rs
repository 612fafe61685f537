// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead rows and the delivery-state transitions used by the CRM worker.

use kiosk_core::{KioskError, Lead, LeadSource, LeadStatus};
use rusqlite::params;

use crate::database::{map_tr_err, now_iso, Database};

const LEAD_COLUMNS: &str = "id, chat_id, last_name, phone, email, whatsapp, company, question, \
                            source, status, sync_attempts, last_attempt_at, crm_id, auto_created, created_at";

fn row_to_lead(row: &rusqlite::Row) -> rusqlite::Result<Lead> {
    let source: String = row.get(8)?;
    let status: String = row.get(9)?;
    Ok(Lead {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        last_name: row.get(2)?,
        phone: row.get(3)?,
        email: row.get(4)?,
        whatsapp: row.get(5)?,
        company: row.get(6)?,
        question: row.get(7)?,
        source: source.parse().unwrap_or(LeadSource::Telegram),
        status: LeadStatus::from_str_value(&status),
        sync_attempts: row.get(10)?,
        last_attempt_at: row.get(11)?,
        crm_id: row.get(12)?,
        auto_created: row.get(13)?,
        created_at: row.get(14)?,
    })
}

/// Persist a new lead. The pipeline validates before calling this.
pub async fn insert_lead(db: &Database, lead: &Lead) -> Result<(), KioskError> {
    let lead = lead.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO leads ({LEAD_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
                ),
                params![
                    lead.id,
                    lead.chat_id,
                    lead.last_name,
                    lead.phone,
                    lead.email,
                    lead.whatsapp,
                    lead.company,
                    lead.question,
                    lead.source.to_string(),
                    lead.status.to_string(),
                    lead.sync_attempts,
                    lead.last_attempt_at,
                    lead.crm_id,
                    lead.auto_created,
                    lead.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Merge newly learned fields into an existing pending lead.
pub async fn augment_lead(db: &Database, lead: &Lead) -> Result<(), KioskError> {
    let lead = lead.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE leads SET
                     last_name = ?2, phone = ?3, email = ?4, whatsapp = ?5,
                     company = ?6, question = ?7
                 WHERE id = ?1",
                params![
                    lead.id,
                    lead.last_name,
                    lead.phone,
                    lead.email,
                    lead.whatsapp,
                    lead.company,
                    lead.question,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_lead(db: &Database, id: &str) -> Result<Option<Lead>, KioskError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"))?;
            let mut rows = stmt.query_map(params![id], row_to_lead)?;
            Ok(rows.next().transpose()?)
        })
        .await
        .map_err(map_tr_err)
}

/// The user's most recent lead still awaiting CRM delivery, if any.
pub async fn open_pending_lead(db: &Database, chat_id: &str) -> Result<Option<Lead>, KioskError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LEAD_COLUMNS} FROM leads
                 WHERE chat_id = ?1 AND status = 'pending_sync'
                 ORDER BY created_at DESC LIMIT 1"
            ))?;
            let mut rows = stmt.query_map(params![chat_id], row_to_lead)?;
            Ok(rows.next().transpose()?)
        })
        .await
        .map_err(map_tr_err)
}

/// True when the user already has a lead created at or after `since`.
/// Prevents duplicate auto-created leads for one idle episode.
pub async fn recent_lead_exists(
    db: &Database,
    chat_id: &str,
    since: &str,
) -> Result<bool, KioskError> {
    let chat_id = chat_id.to_string();
    let since = since.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM leads WHERE chat_id = ?1 AND created_at >= ?2",
                params![chat_id, since],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Leads the delivery worker should pick up: pending, under the attempt
/// cap, and past the retry backoff (or never attempted).
pub async fn due_for_sync(
    db: &Database,
    retry_cutoff: &str,
    limit: usize,
) -> Result<Vec<Lead>, KioskError> {
    let retry_cutoff = retry_cutoff.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LEAD_COLUMNS} FROM leads
                 WHERE status = 'pending_sync' AND sync_attempts < 2
                   AND (last_attempt_at IS NULL OR last_attempt_at <= ?1)
                 ORDER BY created_at ASC LIMIT ?2"
            ))?;
            let leads = stmt
                .query_map(params![retry_cutoff, limit as i64], row_to_lead)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(leads)
        })
        .await
        .map_err(map_tr_err)
}

/// Record a failed delivery attempt. The second failure flips the lead to
/// `failed`; earlier ones leave it pending for the retry schedule.
pub async fn record_failed_attempt(db: &Database, id: &str) -> Result<Lead, KioskError> {
    let id = id.to_string();
    let attempted_at = now_iso();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE leads SET sync_attempts = sync_attempts + 1, last_attempt_at = ?2
                 WHERE id = ?1",
                params![id, attempted_at],
            )?;
            tx.execute(
                "UPDATE leads SET status = 'failed' WHERE id = ?1 AND sync_attempts >= 2",
                params![id],
            )?;
            let lead = tx.query_row(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"),
                params![id],
                row_to_lead,
            )?;
            tx.commit()?;
            Ok(lead)
        })
        .await
        .map_err(map_tr_err)
}

/// Flip a lead straight to `failed`, keeping its attempt count. Used when
/// the CRM rejects the lead permanently and retrying cannot help.
pub async fn mark_failed(db: &Database, id: &str) -> Result<(), KioskError> {
    let id = id.to_string();
    let attempted_at = now_iso();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE leads SET status = 'failed', last_attempt_at = ?2 WHERE id = ?1",
                params![id, attempted_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a lead delivered, recording the CRM record id.
pub async fn mark_synced(db: &Database, id: &str, crm_id: &str) -> Result<(), KioskError> {
    let id = id.to_string();
    let crm_id = crm_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE leads SET status = 'synced', crm_id = ?2 WHERE id = ?1",
                params![id, crm_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lead(id: &str, chat_id: &str) -> Lead {
        Lead {
            id: id.to_string(),
            chat_id: chat_id.to_string(),
            last_name: "Иванов".to_string(),
            phone: Some("+79001234567".to_string()),
            email: None,
            whatsapp: None,
            company: None,
            question: "нужен ноутбук".to_string(),
            source: LeadSource::Telegram,
            status: LeadStatus::PendingSync,
            sync_attempts: 0,
            last_attempt_at: None,
            crm_id: None,
            auto_created: false,
            created_at: now_iso(),
        }
    }

    #[tokio::test]
    async fn insert_and_fetch_round_trip() {
        let db = Database::open_in_memory().await.unwrap();
        insert_lead(&db, &sample_lead("l1", "chat-1")).await.unwrap();

        let lead = get_lead(&db, "l1").await.unwrap().unwrap();
        assert_eq!(lead.last_name, "Иванов");
        assert_eq!(lead.status, LeadStatus::PendingSync);
        assert_eq!(lead.source, LeadSource::Telegram);
    }

    #[tokio::test]
    async fn due_for_sync_respects_attempt_cap_and_backoff() {
        let db = Database::open_in_memory().await.unwrap();
        insert_lead(&db, &sample_lead("l1", "chat-1")).await.unwrap();

        let due = due_for_sync(&db, &now_iso(), 10).await.unwrap();
        assert_eq!(due.len(), 1);

        // One failed attempt: still pending, but gated by last_attempt_at.
        let lead = record_failed_attempt(&db, "l1").await.unwrap();
        assert_eq!(lead.sync_attempts, 1);
        assert_eq!(lead.status, LeadStatus::PendingSync);

        let before_attempt = "2000-01-01T00:00:00.000Z";
        assert!(due_for_sync(&db, before_attempt, 10).await.unwrap().is_empty());
        assert_eq!(due_for_sync(&db, &now_iso(), 10).await.unwrap().len(), 1);

        // Second failure flips to failed and leaves the queue.
        let lead = record_failed_attempt(&db, "l1").await.unwrap();
        assert_eq!(lead.sync_attempts, 2);
        assert_eq!(lead.status, LeadStatus::Failed);
        assert!(due_for_sync(&db, &now_iso(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn synced_leads_leave_the_queue() {
        let db = Database::open_in_memory().await.unwrap();
        insert_lead(&db, &sample_lead("l1", "chat-1")).await.unwrap();
        mark_synced(&db, "l1", "crm-42").await.unwrap();

        let lead = get_lead(&db, "l1").await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Synced);
        assert_eq!(lead.crm_id.as_deref(), Some("crm-42"));
        assert!(due_for_sync(&db, &now_iso(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_pending_lead_ignores_synced() {
        let db = Database::open_in_memory().await.unwrap();
        insert_lead(&db, &sample_lead("l1", "chat-1")).await.unwrap();
        mark_synced(&db, "l1", "crm-1").await.unwrap();
        assert!(open_pending_lead(&db, "chat-1").await.unwrap().is_none());

        insert_lead(&db, &sample_lead("l2", "chat-1")).await.unwrap();
        let pending = open_pending_lead(&db, "chat-1").await.unwrap().unwrap();
        assert_eq!(pending.id, "l2");
    }

    #[tokio::test]
    async fn recent_lead_dedupe_window() {
        let db = Database::open_in_memory().await.unwrap();
        insert_lead(&db, &sample_lead("l1", "chat-1")).await.unwrap();

        assert!(recent_lead_exists(&db, "chat-1", "2000-01-01T00:00:00.000Z")
            .await
            .unwrap());
        assert!(!recent_lead_exists(&db, "chat-1", "2999-01-01T00:00:00.000Z")
            .await
            .unwrap());
        assert!(!recent_lead_exists(&db, "chat-2", "2000-01-01T00:00:00.000Z")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn augment_merges_fields() {
        let db = Database::open_in_memory().await.unwrap();
        let mut lead = sample_lead("l1", "chat-1");
        insert_lead(&db, &lead).await.unwrap();

        lead.email = Some("ivan@example.com".to_string());
        lead.question = "нужен ноутбук; перезвоните".to_string();
        augment_lead(&db, &lead).await.unwrap();

        let stored = get_lead(&db, "l1").await.unwrap().unwrap();
        assert_eq!(stored.email.as_deref(), Some("ivan@example.com"));
        assert!(stored.question.contains("перезвоните"));
    }
}

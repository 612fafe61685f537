// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead capture: create-or-augment keyed by chat_id, validation, durable
//! persistence ahead of any CRM traffic, and manager notification.
//!
//! Persist-then-deliver is the cornerstone of at-least-once semantics: a
//! crash after the lead row lands is recovered by the delivery worker.

use std::sync::Arc;

use kiosk_core::{KioskError, Lead, LeadSource, LeadStatus, User};
use kiosk_logging::HybridLogger;
use kiosk_notify::Notifiers;
use kiosk_storage::{now_iso, queries, Database};
use tracing::debug;

use crate::validate;

/// Contact fields extracted from a conversation or a user profile, before
/// validation.
#[derive(Debug, Clone, Default)]
pub struct LeadDraft {
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub whatsapp: Option<String>,
    pub company: Option<String>,
    pub question: String,
    pub source: Option<LeadSource>,
    pub auto_created: bool,
}

pub struct LeadPipeline {
    db: Database,
    notifiers: Arc<Notifiers>,
    logger: Arc<HybridLogger>,
}

impl LeadPipeline {
    pub fn new(db: Database, notifiers: Arc<Notifiers>, logger: Arc<HybridLogger>) -> Arc<Self> {
        Arc::new(Self {
            db,
            notifiers,
            logger,
        })
    }

    /// Validate the draft and create a lead for `chat_id`, or augment the
    /// user's open pending lead. The lead is durably `pending_sync` before
    /// this returns; the CRM worker picks it up from there. Managers are
    /// notified over both channels.
    pub async fn capture(&self, chat_id: &str, draft: LeadDraft) -> Result<Lead, KioskError> {
        let last_name = validate::validate_last_name(&draft.last_name)?;
        let phone = draft
            .phone
            .as_deref()
            .map(validate::normalize_phone)
            .transpose()?;
        let email = draft
            .email
            .as_deref()
            .map(validate::validate_email)
            .transpose()?;
        if phone.is_none() && email.is_none() {
            return Err(KioskError::Validation(
                "a phone number or an email address is required".into(),
            ));
        }

        let lead = match queries::leads::open_pending_lead(&self.db, chat_id).await? {
            Some(mut existing) => {
                existing.last_name = last_name;
                existing.phone = phone.or(existing.phone);
                existing.email = email.or(existing.email);
                existing.whatsapp = draft.whatsapp.or(existing.whatsapp);
                existing.company = draft.company.or(existing.company);
                if !draft.question.is_empty() && existing.question != draft.question {
                    if existing.question.is_empty() {
                        existing.question = draft.question;
                    } else {
                        existing.question = format!("{}; {}", existing.question, draft.question);
                    }
                }
                queries::leads::augment_lead(&self.db, &existing).await?;
                debug!(lead_id = existing.id.as_str(), "augmented pending lead");
                existing
            }
            None => {
                let lead = Lead {
                    id: uuid::Uuid::new_v4().to_string(),
                    chat_id: chat_id.to_string(),
                    last_name,
                    phone,
                    email,
                    whatsapp: draft.whatsapp,
                    company: draft.company,
                    question: draft.question,
                    source: draft.source.unwrap_or(LeadSource::Telegram),
                    status: LeadStatus::PendingSync,
                    sync_attempts: 0,
                    last_attempt_at: None,
                    crm_id: None,
                    auto_created: draft.auto_created,
                    created_at: now_iso(),
                };
                queries::leads::insert_lead(&self.db, &lead).await?;
                lead
            }
        };

        // Remember the contact fields on the user as well.
        queries::users::update_contact(
            &self.db,
            chat_id,
            lead.phone.as_deref(),
            lead.email.as_deref(),
        )
        .await?;

        self.logger
            .business(
                "lead captured",
                Some(serde_json::json!({
                    "lead_id": lead.id,
                    "chat_id": chat_id,
                    "auto_created": lead.auto_created,
                    "has_phone": lead.phone.is_some(),
                    "has_email": lead.email.is_some(),
                })),
            )
            .await;

        self.notifiers.notify_new_lead(&lead).await;
        Ok(lead)
    }

    /// Auto-create a lead for an idle user from whatever contact fields are
    /// already known. Returns `Ok(None)` when the known fields cannot make
    /// a valid lead (the monitor then schedules a re-engagement prompt
    /// instead) or when a lead already exists for this idle episode.
    pub async fn capture_from_inactivity(
        &self,
        user: &User,
        question: &str,
        dedupe_since: &str,
    ) -> Result<Option<Lead>, KioskError> {
        if queries::leads::recent_lead_exists(&self.db, &user.chat_id, dedupe_since).await? {
            debug!(chat_id = user.chat_id.as_str(), "recent lead exists, skipping auto-create");
            return Ok(None);
        }

        let last_name = user
            .last_name
            .clone()
            .or_else(|| user.first_name.clone())
            .or_else(|| user.username.clone())
            .unwrap_or_default();

        let draft = LeadDraft {
            last_name,
            phone: user.phone.clone(),
            email: user.email.clone(),
            question: question.to_string(),
            auto_created: true,
            ..LeadDraft::default()
        };

        match self.capture(&user.chat_id, draft).await {
            Ok(lead) => Ok(Some(lead)),
            // Not enough known fields for a valid lead; let the monitor
            // re-engage the user instead.
            Err(KioskError::Validation(reason)) => {
                debug!(chat_id = user.chat_id.as_str(), reason, "auto-create not possible");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_config::model::{NotifyConfig, TelegramConfig};
    use kiosk_notify::{EmailNotifier, TelegramNotifier};

    fn notifiers() -> Arc<Notifiers> {
        let notify = NotifyConfig::default();
        Arc::new(Notifiers::new(
            TelegramNotifier::new(&TelegramConfig::default(), &notify),
            EmailNotifier::new(notify),
        ))
    }

    async fn pipeline() -> (Arc<LeadPipeline>, Database) {
        let db = Database::open_in_memory().await.unwrap();
        let logger = HybridLogger::new(db.clone(), notifiers());
        (LeadPipeline::new(db.clone(), notifiers(), logger), db)
    }

    fn draft(last_name: &str, phone: Option<&str>) -> LeadDraft {
        LeadDraft {
            last_name: last_name.to_string(),
            phone: phone.map(String::from),
            question: "нужен ноутбук".to_string(),
            ..LeadDraft::default()
        }
    }

    #[tokio::test]
    async fn capture_persists_pending_lead() {
        let (pipeline, db) = pipeline().await;
        queries::users::upsert_user(&db, "chat-1", None, None, None)
            .await
            .unwrap();

        let lead = pipeline
            .capture("chat-1", draft("Иванов", Some("89001234567")))
            .await
            .unwrap();
        assert_eq!(lead.status, LeadStatus::PendingSync);
        assert_eq!(lead.phone.as_deref(), Some("+79001234567"));
        assert_eq!(lead.source, LeadSource::Telegram);

        let stored = queries::leads::get_lead(&db, &lead.id).await.unwrap().unwrap();
        assert_eq!(stored.status, LeadStatus::PendingSync);

        // The business log row landed too.
        let rows = queries::logs::recent_logs(&db, "BUSINESS", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn capture_requires_some_contact() {
        let (pipeline, _db) = pipeline().await;
        let err = pipeline
            .capture("chat-1", draft("Иванов", None))
            .await
            .unwrap_err();
        assert!(matches!(err, KioskError::Validation(_)));
    }

    #[tokio::test]
    async fn capture_requires_last_name() {
        let (pipeline, _db) = pipeline().await;
        let err = pipeline
            .capture("chat-1", draft("  ", Some("+79001234567")))
            .await
            .unwrap_err();
        assert!(matches!(err, KioskError::Validation(_)));
    }

    #[tokio::test]
    async fn second_capture_augments_open_lead() {
        let (pipeline, db) = pipeline().await;
        queries::users::upsert_user(&db, "chat-1", None, None, None)
            .await
            .unwrap();

        let first = pipeline
            .capture("chat-1", draft("Иванов", Some("+79001234567")))
            .await
            .unwrap();

        let mut second_draft = draft("Иванов", None);
        second_draft.email = Some("ivan@example.com".into());
        second_draft.question = "перезвоните завтра".into();
        let second = pipeline.capture("chat-1", second_draft).await.unwrap();

        assert_eq!(first.id, second.id, "open pending lead is augmented, not duplicated");
        assert_eq!(second.phone.as_deref(), Some("+79001234567"));
        assert_eq!(second.email.as_deref(), Some("ivan@example.com"));
        assert!(second.question.contains("нужен ноутбук"));
        assert!(second.question.contains("перезвоните завтра"));
    }

    #[tokio::test]
    async fn inactivity_capture_uses_known_fields() {
        let (pipeline, db) = pipeline().await;
        queries::users::upsert_user(&db, "chat-1", Some("Ivan"), Some("Ivanov"), None)
            .await
            .unwrap();
        queries::users::update_contact(&db, "chat-1", Some("+79001234567"), None)
            .await
            .unwrap();
        let user = queries::users::get_user(&db, "chat-1").await.unwrap().unwrap();

        let lead = pipeline
            .capture_from_inactivity(&user, "went idle after product inquiry", "2000-01-01T00:00:00.000Z")
            .await
            .unwrap()
            .unwrap();
        assert!(lead.auto_created);
        assert_eq!(lead.last_name, "Ivanov");
    }

    #[tokio::test]
    async fn inactivity_capture_without_contact_returns_none() {
        let (pipeline, db) = pipeline().await;
        queries::users::upsert_user(&db, "chat-1", Some("Ivan"), None, None)
            .await
            .unwrap();
        let user = queries::users::get_user(&db, "chat-1").await.unwrap().unwrap();

        let result = pipeline
            .capture_from_inactivity(&user, "idle", "2000-01-01T00:00:00.000Z")
            .await
            .unwrap();
        assert!(result.is_none(), "no contact fields means no lead");
    }

    #[tokio::test]
    async fn inactivity_capture_dedupes_per_episode() {
        let (pipeline, db) = pipeline().await;
        queries::users::upsert_user(&db, "chat-1", None, Some("Ivanov"), None)
            .await
            .unwrap();
        queries::users::update_contact(&db, "chat-1", Some("+79001234567"), None)
            .await
            .unwrap();
        let user = queries::users::get_user(&db, "chat-1").await.unwrap().unwrap();

        let first = pipeline
            .capture_from_inactivity(&user, "idle", "2000-01-01T00:00:00.000Z")
            .await
            .unwrap();
        assert!(first.is_some());

        let second = pipeline
            .capture_from_inactivity(&user, "idle", "2000-01-01T00:00:00.000Z")
            .await
            .unwrap();
        assert!(second.is_none(), "same idle episode must not duplicate the lead");
    }
}

// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Manager and admin notifications via the Telegram Bot API.

use kiosk_config::model::{NotifyConfig, TelegramConfig};
use kiosk_core::{KioskError, Lead};
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::{debug, warn};

/// Sends formatted notifications to the manager group chat and admin ids.
///
/// A fresh `Bot` handle is created inside each send so no long-lived API
/// session outlives the call.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot_token: Option<String>,
    manager_chat_id: Option<i64>,
    admin_ids: Vec<i64>,
}

impl TelegramNotifier {
    pub fn new(telegram: &TelegramConfig, notify: &NotifyConfig) -> Self {
        let manager_chat_id = notify
            .manager_telegram_chat_id
            .as_deref()
            .and_then(|id| id.trim().parse().ok());
        if notify.manager_telegram_chat_id.is_some() && manager_chat_id.is_none() {
            warn!("MANAGER_TELEGRAM_CHAT_ID is not a valid chat id, lead notifications disabled");
        }
        Self {
            bot_token: telegram.bot_token.clone(),
            manager_chat_id,
            admin_ids: notify.admin_ids(),
        }
    }

    /// Post a new-lead notification to the manager group chat.
    pub async fn notify_new_lead(&self, lead: &Lead) -> Result<(), KioskError> {
        let Some(chat_id) = self.manager_chat_id else {
            debug!("manager chat id not configured, skipping lead notification");
            return Ok(());
        };
        let token = self.token()?;
        let text = format_lead_notification(lead);

        let bot = Bot::new(token);
        bot.send_message(ChatId(chat_id), text)
            .await
            .map_err(|e| KioskError::transient("telegram", e.to_string()))?;
        Ok(())
    }

    /// Send a plain message to the manager group chat.
    pub async fn send_to_managers(&self, message: &str) -> Result<(), KioskError> {
        let Some(chat_id) = self.manager_chat_id else {
            debug!("manager chat id not configured, skipping message");
            return Ok(());
        };
        let token = self.token()?;
        let bot = Bot::new(token);
        bot.send_message(ChatId(chat_id), message.to_string())
            .await
            .map_err(|e| KioskError::transient("telegram", e.to_string()))?;
        Ok(())
    }

    /// Send a message to every configured administrator. Per-admin failures
    /// are logged and do not abort the remaining sends.
    pub async fn send_to_admins(&self, message: &str) -> Result<(), KioskError> {
        if self.admin_ids.is_empty() {
            debug!("no admin telegram ids configured, skipping alert");
            return Ok(());
        }
        let token = self.token()?;
        let bot = Bot::new(token);
        for admin_id in &self.admin_ids {
            if let Err(e) = bot.send_message(ChatId(*admin_id), message).await {
                warn!(admin_id, error = %e, "failed to alert admin");
            }
        }
        Ok(())
    }

    fn token(&self) -> Result<&str, KioskError> {
        self.bot_token
            .as_deref()
            .ok_or_else(|| KioskError::Config("BOT_TOKEN is required for notifications".into()))
    }
}

/// Plain-text notification body for a freshly captured lead.
fn format_lead_notification(lead: &Lead) -> String {
    let mut lines = vec![
        "New lead".to_string(),
        format!("Name: {}", lead.last_name),
    ];
    if let Some(phone) = &lead.phone {
        lines.push(format!("Phone: {phone}"));
    }
    if let Some(email) = &lead.email {
        lines.push(format!("Email: {email}"));
    }
    if let Some(company) = &lead.company {
        lines.push(format!("Company: {company}"));
    }
    if !lead.question.is_empty() {
        lines.push(format!("Question: {}", lead.question));
    }
    lines.push(format!("Source: {}", lead.source));
    if lead.auto_created {
        lines.push("Auto-created after inactivity".to_string());
    }
    lines.join("\n")
}

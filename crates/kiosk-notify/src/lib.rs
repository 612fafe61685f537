// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Manager and administrator notifications over Telegram and email.
//!
//! The two channels are independent: a failure on one never suppresses the
//! other. Transport handles (the teloxide `Bot`, the SMTP connection) are
//! acquired inside each call and released on every exit path.

pub mod email;
pub mod telegram;

use kiosk_core::Lead;
use tracing::warn;

pub use email::EmailNotifier;
pub use telegram::TelegramNotifier;

/// Both notification channels bundled for call sites that fan out to both.
#[derive(Clone)]
pub struct Notifiers {
    pub telegram: TelegramNotifier,
    pub email: EmailNotifier,
}

impl Notifiers {
    pub fn new(telegram: TelegramNotifier, email: EmailNotifier) -> Self {
        Self { telegram, email }
    }

    /// Notify managers about a new lead over both channels. Each channel's
    /// failure is logged and swallowed.
    pub async fn notify_new_lead(&self, lead: &Lead) {
        if let Err(e) = self.telegram.notify_new_lead(lead).await {
            warn!(error = %e, lead_id = lead.id.as_str(), "telegram lead notification failed");
        }
        if let Err(e) = self.email.notify_new_lead(lead).await {
            warn!(error = %e, lead_id = lead.id.as_str(), "email lead notification failed");
        }
    }

    /// Deliver a critical alert to administrators over both channels.
    pub async fn send_critical_alert(&self, message: &str) {
        if let Err(e) = self.telegram.send_to_admins(message).await {
            warn!(error = %e, "telegram admin alert failed");
        }
        if let Err(e) = self.email.send_alert("Critical alert", message).await {
            warn!(error = %e, "email admin alert failed");
        }
    }
}

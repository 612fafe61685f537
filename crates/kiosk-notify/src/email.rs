// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SMTP email notifications via lettre.
//!
//! When SMTP is not configured, sends degrade to a log line so the rest of
//! the pipeline keeps working in development environments.

use kiosk_config::model::NotifyConfig;
use kiosk_core::{KioskError, Lead};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

/// Sends notification mail to the configured manager addresses.
#[derive(Clone)]
pub struct EmailNotifier {
    config: NotifyConfig,
}

impl EmailNotifier {
    pub fn new(config: NotifyConfig) -> Self {
        Self { config }
    }

    /// Mail the manager list about a new lead.
    pub async fn notify_new_lead(&self, lead: &Lead) -> Result<(), KioskError> {
        let subject = format!("New lead: {}", lead.last_name);
        let body = format!(
            "A new lead was captured.\n\nName: {}\nPhone: {}\nEmail: {}\nQuestion: {}\nSource: {}\n",
            lead.last_name,
            lead.phone.as_deref().unwrap_or("-"),
            lead.email.as_deref().unwrap_or("-"),
            lead.question,
            lead.source,
        );
        self.send(&subject, &body).await
    }

    /// Mail the manager list an alert.
    pub async fn send_alert(&self, subject: &str, body: &str) -> Result<(), KioskError> {
        self.send(subject, body).await
    }

    async fn send(&self, subject: &str, body: &str) -> Result<(), KioskError> {
        let recipients = self.config.manager_email_list();
        if recipients.is_empty() {
            debug!("no manager emails configured, skipping mail");
            return Ok(());
        }
        if !self.config.smtp_configured() {
            info!(subject, "SMTP not configured, mail not sent");
            return Ok(());
        }

        // smtp_configured() guarantees these are present.
        let host = self.config.smtp_host.clone().unwrap_or_default();
        let user = self.config.smtp_user.clone().unwrap_or_default();
        let password = self.config.smtp_password.clone().unwrap_or_default();

        let transport: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
                .map_err(|e| KioskError::transient("smtp", e.to_string()))?
                .credentials(Credentials::new(user.clone(), password))
                .build();

        for recipient in recipients {
            let message = Message::builder()
                .from(
                    user.parse()
                        .map_err(|e| KioskError::Config(format!("SMTP_USER is not a mailbox: {e}")))?,
                )
                .to(recipient
                    .parse()
                    .map_err(|e| KioskError::Config(format!("bad manager email {recipient:?}: {e}")))?)
                .subject(subject)
                .header(ContentType::TEXT_PLAIN)
                .body(body.to_string())
                .map_err(|e| KioskError::Internal(format!("mail build failed: {e}")))?;

            transport
                .send(message)
                .await
                .map_err(|e| KioskError::transient("smtp", e.to_string()))?;
        }
        Ok(())
    }
}

// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inactivity monitor: a periodic scan over users with open conversations.
//!
//! Users idle past the threshold whose recent turns carry qualifying
//! signals (a PRODUCT or CONTACT intent) are handed to the lead pipeline.
//! When the known contact fields cannot make a valid lead, a re-engagement
//! prompt is queued for the transport instead. Each idle episode is
//! handled once: the last-activity timestamp it was handled at is
//! remembered per chat.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use kiosk_core::KioskError;
use kiosk_leads::LeadPipeline;
use kiosk_logging::HybridLogger;
use kiosk_storage::{queries, Database};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often the scan runs.
const SCAN_INTERVAL: Duration = Duration::from_secs(600);

/// Window for qualifying signals and for the duplicate-lead check.
const SIGNAL_WINDOW_HOURS: i64 = 24;

/// A message the monitor asks the transport to deliver.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub chat_id: String,
    pub text: String,
}

pub struct InactivityMonitor {
    db: Database,
    pipeline: Arc<LeadPipeline>,
    logger: Arc<HybridLogger>,
    threshold_minutes: i64,
    outbound: mpsc::Sender<OutboundMessage>,
    /// chat_id -> last-activity timestamp already handled.
    handled: DashMap<String, String>,
    /// chat_id -> in-memory last-activity hint from the orchestrator.
    activity: DashMap<String, String>,
}

impl InactivityMonitor {
    pub fn new(
        db: Database,
        pipeline: Arc<LeadPipeline>,
        logger: Arc<HybridLogger>,
        threshold_minutes: i64,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            pipeline,
            logger,
            threshold_minutes,
            outbound,
            handled: DashMap::new(),
            activity: DashMap::new(),
        })
    }

    /// Called by the orchestrator after every completed turn.
    pub fn note_activity(&self, chat_id: &str) {
        self.activity
            .insert(chat_id.to_string(), kiosk_storage::now_iso());
    }

    /// Scan loop. Cancellable on shutdown.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            threshold_minutes = self.threshold_minutes,
            "inactivity monitor started"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(SCAN_INTERVAL) => {
                    if let Err(e) = self.scan_once().await {
                        warn!(error = %e, "inactivity scan failed");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
        info!("inactivity monitor stopped");
    }

    /// One scan: users with open conversations, most idle first. Failures
    /// on one user never stall the rest.
    pub async fn scan_once(&self) -> Result<usize, KioskError> {
        let now = chrono::Utc::now();
        let idle_cutoff = (now - chrono::Duration::minutes(self.threshold_minutes))
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        let signal_cutoff = (now - chrono::Duration::hours(SIGNAL_WINDOW_HOURS))
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();

        let mut candidates = Vec::new();
        for conversation in queries::conversations::list_open(&self.db).await? {
            let last_activity = match queries::messages::latest_activity(
                &self.db,
                &conversation.chat_id,
            )
            .await?
            {
                Some(ts) => ts,
                None => {
                    // Fall back to the in-memory hint for users whose turns
                    // have not produced a stored message yet.
                    match self.activity.get(&conversation.chat_id) {
                        Some(hint) => hint.clone(),
                        None => continue,
                    }
                }
            };
            if last_activity <= idle_cutoff {
                candidates.push((conversation, last_activity));
            }
        }
        // Most idle first.
        candidates.sort_by(|a, b| a.1.cmp(&b.1));

        let mut handed_off = 0;
        for (conversation, last_activity) in candidates {
            let chat_id = conversation.chat_id.clone();
            if self
                .handled
                .get(&chat_id)
                .map(|handled| *handled == last_activity)
                .unwrap_or(false)
            {
                continue; // this idle episode is already handled
            }

            match self
                .handle_idle_user(&conversation.id, &chat_id, &signal_cutoff)
                .await
            {
                Ok(created) => {
                    if created {
                        handed_off += 1;
                    }
                    self.handled.insert(chat_id, last_activity);
                }
                Err(e) => {
                    self.logger
                        .error(
                            &format!("inactivity handling failed for {chat_id}: {e}"),
                            None,
                        )
                        .await;
                }
            }
        }
        Ok(handed_off)
    }

    async fn handle_idle_user(
        &self,
        conversation_id: &str,
        chat_id: &str,
        signal_cutoff: &str,
    ) -> Result<bool, KioskError> {
        let intents =
            queries::messages::intents_since(&self.db, conversation_id, signal_cutoff).await?;
        let qualifying = intents
            .iter()
            .any(|intent| intent == "PRODUCT" || intent == "CONTACT");
        if !qualifying {
            debug!(chat_id, "idle user without qualifying signals");
            return Ok(false);
        }

        let Some(user) = queries::users::get_user(&self.db, chat_id).await? else {
            return Ok(false);
        };

        match self
            .pipeline
            .capture_from_inactivity(
                &user,
                "Auto-created after the conversation went idle",
                signal_cutoff,
            )
            .await?
        {
            Some(lead) => {
                self.logger
                    .business(
                        "lead auto-created after inactivity",
                        Some(serde_json::json!({"lead_id": lead.id, "chat_id": chat_id})),
                    )
                    .await;
                // The idle episode closes the session; the next message
                // opens a fresh conversation.
                queries::conversations::end_conversation(&self.db, conversation_id).await?;
                Ok(true)
            }
            None => {
                // Not enough contact data: nudge the user instead.
                let nudge = OutboundMessage {
                    chat_id: chat_id.to_string(),
                    text: "Мы можем подобрать для вас предложение. Оставьте, пожалуйста, \
                           фамилию и телефон или email, и менеджер свяжется с вами. / We can \
                           prepare an offer for you. Please leave a last name and a phone \
                           number or email, and a manager will be in touch."
                        .to_string(),
                };
                if self.outbound.try_send(nudge).is_err() {
                    warn!(chat_id, "outbound queue full, dropping re-engagement prompt");
                }
                Ok(false)
            }
        }
    }
}

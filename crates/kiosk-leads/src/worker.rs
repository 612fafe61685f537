// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background CRM delivery worker.
//!
//! Drains leads in `pending_sync` with fewer than two attempts, past the
//! 30-minute retry backoff. Delivery is idempotent per lead: a dedupe
//! search runs before every insert, so a retry lands as a note on the
//! record the previous attempt created. A per-lead lock prevents
//! concurrent delivery of the same lead; distinct leads deliver in
//! parallel.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use kiosk_core::{KioskError, Lead, LeadStatus};
use kiosk_logging::HybridLogger;
use kiosk_notify::Notifiers;
use kiosk_storage::{queries, Database};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::crm::{CrmClient, CrmLeadPayload};

/// Minutes to wait before retrying a failed delivery.
pub const RETRY_DELAY_MINUTES: i64 = 30;

/// How often the worker polls for due leads.
const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Leads picked up per polling cycle.
const DRAIN_LIMIT: usize = 20;

pub struct CrmWorker {
    db: Database,
    crm: Arc<dyn CrmClient>,
    notifiers: Arc<Notifiers>,
    logger: Arc<HybridLogger>,
    in_flight: DashMap<String, ()>,
}

impl CrmWorker {
    pub fn new(
        db: Database,
        crm: Arc<dyn CrmClient>,
        notifiers: Arc<Notifiers>,
        logger: Arc<HybridLogger>,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            crm,
            notifiers,
            logger,
            in_flight: DashMap::new(),
        })
    }

    /// Polling loop. Cancellable; an in-flight drain completes before the
    /// loop exits.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!("crm delivery worker started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    self.drain_once().await;
                }
                _ = cancel.cancelled() => break,
            }
        }
        info!("crm delivery worker stopped");
    }

    /// One polling cycle: deliver every due lead, distinct leads in
    /// parallel. One bad lead never stalls the rest.
    pub async fn drain_once(&self) -> usize {
        let cutoff = (chrono::Utc::now() - chrono::Duration::minutes(RETRY_DELAY_MINUTES))
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        let due = match queries::leads::due_for_sync(&self.db, &cutoff, DRAIN_LIMIT).await {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "failed to query due leads");
                return 0;
            }
        };
        if due.is_empty() {
            return 0;
        }
        debug!(count = due.len(), "delivering due leads");

        let deliveries = due.into_iter().map(|lead| self.deliver(lead));
        let results = futures::future::join_all(deliveries).await;
        results.into_iter().filter(|delivered| *delivered).count()
    }

    /// Deliver one lead. Returns true when the lead reached `synced`.
    pub async fn deliver(&self, lead: Lead) -> bool {
        // Per-lead advisory lock.
        if self.in_flight.insert(lead.id.clone(), ()).is_some() {
            debug!(lead_id = lead.id.as_str(), "delivery already in flight");
            return false;
        }
        let result = self.deliver_locked(&lead).await;
        self.in_flight.remove(&lead.id);

        match result {
            Ok(()) => true,
            Err(e) => {
                self.handle_failure(&lead, e).await;
                false
            }
        }
    }

    async fn deliver_locked(&self, lead: &Lead) -> Result<(), KioskError> {
        // A concurrent deliverer may have finished while we waited.
        let current = queries::leads::get_lead(&self.db, &lead.id)
            .await?
            .ok_or_else(|| KioskError::NotFound(format!("lead {}", lead.id)))?;
        if current.status != LeadStatus::PendingSync {
            debug!(lead_id = lead.id.as_str(), "lead no longer pending, skipping");
            return Ok(());
        }

        // Dedupe before insert keeps retries idempotent.
        let crm_id = match self
            .crm
            .search(current.phone.as_deref(), current.email.as_deref())
            .await?
        {
            Some(existing) => {
                self.crm.add_note(&existing.id, &current.question).await?;
                debug!(lead_id = lead.id.as_str(), crm_id = existing.id.as_str(), "attached note to existing record");
                existing.id
            }
            None => {
                let created = self
                    .crm
                    .create_lead(&CrmLeadPayload::from_lead(&current))
                    .await?;
                created.id
            }
        };

        queries::leads::mark_synced(&self.db, &lead.id, &crm_id).await?;
        self.logger
            .business(
                "lead synced to CRM",
                Some(serde_json::json!({"lead_id": lead.id, "crm_id": crm_id})),
            )
            .await;
        if let Err(e) = self
            .notifiers
            .telegram
            .send_to_managers(&format!(
                "Lead {} delivered to CRM (record {crm_id})",
                current.last_name
            ))
            .await
        {
            warn!(error = %e, "sync notification failed");
        }
        Ok(())
    }

    async fn handle_failure(&self, lead: &Lead, error: KioskError) {
        if error.is_transient() {
            match queries::leads::record_failed_attempt(&self.db, &lead.id).await {
                Ok(updated) if updated.status == LeadStatus::Failed => {
                    self.logger
                        .critical(
                            &format!(
                                "lead {} failed CRM delivery after {} attempts: {error}",
                                lead.id, updated.sync_attempts
                            ),
                            Some(serde_json::json!({"lead_id": lead.id})),
                        )
                        .await;
                }
                Ok(updated) => {
                    self.logger
                        .warning(
                            &format!(
                                "lead {} delivery attempt {} failed, retry in {RETRY_DELAY_MINUTES} minutes: {error}",
                                lead.id, updated.sync_attempts
                            ),
                            Some(serde_json::json!({"lead_id": lead.id})),
                        )
                        .await;
                }
                Err(e) => warn!(error = %e, "failed to record delivery attempt"),
            }
        } else {
            // Permanent CRM errors cannot be retried away.
            if let Err(e) = queries::leads::mark_failed(&self.db, &lead.id).await {
                warn!(error = %e, "failed to mark lead failed");
            }
            self.logger
                .critical(
                    &format!("lead {} rejected by CRM: {error}", lead.id),
                    Some(serde_json::json!({"lead_id": lead.id})),
                )
                .await;
        }
    }
}

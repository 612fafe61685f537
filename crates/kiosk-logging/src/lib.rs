// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hybrid logging: console via tracing, durable rows for WARNING and above,
//! out-of-band admin alerts for CRITICAL, and BUSINESS rows for analytics.
//!
//! Alerts flow through a bounded channel drained by a background dispatcher,
//! so a failing alert channel can never back-pressure business operations.
//! Logging failures are swallowed after a console warning; the logger must
//! not take down its caller.

use std::sync::Arc;

use kiosk_notify::Notifiers;
use kiosk_storage::{queries, Database};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capacity of the alert queue. Alerts beyond it are dropped with a console
/// warning rather than blocking the caller.
const ALERT_BUFFER: usize = 64;

/// Routes events to the console, the durable log table, and the admin alert
/// channel depending on severity.
pub struct HybridLogger {
    db: Database,
    alert_tx: mpsc::Sender<String>,
    dispatcher: Mutex<Option<tokio::task::JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl HybridLogger {
    /// Create the logger and start its alert dispatcher task.
    pub fn new(db: Database, notifiers: Arc<Notifiers>) -> Arc<Self> {
        let (alert_tx, mut alert_rx) = mpsc::channel::<String>(ALERT_BUFFER);
        let cancel = CancellationToken::new();
        let dispatcher_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = alert_rx.recv() => {
                        match event {
                            Some(message) => notifiers.send_critical_alert(&message).await,
                            None => break,
                        }
                    }
                    _ = dispatcher_cancel.cancelled() => {
                        // Drain whatever is already queued, then stop.
                        while let Ok(message) = alert_rx.try_recv() {
                            notifiers.send_critical_alert(&message).await;
                        }
                        break;
                    }
                }
            }
            debug!("alert dispatcher stopped");
        });

        Arc::new(Self {
            db,
            alert_tx,
            dispatcher: Mutex::new(Some(handle)),
            cancel,
        })
    }

    /// Console-only informational logging.
    pub fn info(&self, message: &str) {
        info!("{message}");
    }

    /// Console-only debug logging.
    pub fn debug(&self, message: &str) {
        debug!("{message}");
    }

    /// Warning: console + durable row.
    pub async fn warning(&self, message: &str, metadata: Option<serde_json::Value>) {
        warn!("{message}");
        self.persist("WARNING", message, metadata).await;
    }

    /// Error: console + durable row.
    pub async fn error(&self, message: &str, metadata: Option<serde_json::Value>) {
        error!("{message}");
        self.persist("ERROR", message, metadata).await;
    }

    /// Critical: console + durable row + fire-and-forget admin alert.
    pub async fn critical(&self, message: &str, metadata: Option<serde_json::Value>) {
        error!("CRITICAL: {message}");
        self.persist("CRITICAL", message, metadata).await;
        if self.alert_tx.try_send(message.to_string()).is_err() {
            warn!("alert buffer full, dropping critical alert");
        }
    }

    /// Business event for analytics: durable row only.
    pub async fn business(&self, message: &str, metadata: Option<serde_json::Value>) {
        debug!("business event: {message}");
        self.persist("BUSINESS", message, metadata).await;
    }

    async fn persist(&self, level: &str, message: &str, metadata: Option<serde_json::Value>) {
        let metadata = metadata.map(|m| m.to_string());
        if let Err(e) = queries::logs::insert_log(&self.db, level, message, metadata).await {
            // Never propagate logging failures to the caller.
            warn!(error = %e, "failed to persist log row");
        }
    }

    /// Flush queued alerts and stop the dispatcher. Part of the shutdown
    /// sequence; safe to call once.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.dispatcher.lock().await.take() {
            let _ = handle.await;
        }
    }
}

// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `kiosk serve` and `kiosk index` command implementations.
//!
//! Serve wires the whole system: storage, prompts, the LLM gateway, the
//! catalog engine, the orchestrator, the CRM worker, the inactivity
//! monitor, the HTTP gateway, and (unless disabled) the Telegram polling
//! loop. Shutdown order: stop intake, drain in-flight work, stop the
//! background workers, flush the logger, checkpoint the database.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kiosk_agent::{
    ConversationStore, InactivityMonitor, KnowledgeStore, Orchestrator, QueryClassifier,
};
use kiosk_catalog::CatalogEngine;
use kiosk_config::{load_config, validate, KioskConfig};
use kiosk_core::KioskError;
use kiosk_cost::guard::run_weekly_report;
use kiosk_cost::CostGuard;
use kiosk_gateway::AppState;
use kiosk_leads::{CrmWorker, HttpCrmClient, LeadPipeline};
use kiosk_llm::{LlmGateway, PromptRegistry};
use kiosk_logging::HybridLogger;
use kiosk_notify::{EmailNotifier, Notifiers, TelegramNotifier};
use kiosk_storage::Database;
use kiosk_telegram::TelegramChannel;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::shutdown;

/// Time allowed for in-flight work to finish after the shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Queue between the inactivity monitor and the transport.
const OUTBOUND_QUEUE: usize = 64;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

/// Run the full agent until SIGINT/SIGTERM.
pub async fn run_serve() -> Result<(), KioskError> {
    init_tracing();
    let config = load_config().map_err(|e| KioskError::Config(e.to_string()))?;
    validate(&config)?;
    info!("starting kiosk serve");

    let db = Database::open(&config.database.url).await?;

    let notifiers = Arc::new(Notifiers::new(
        TelegramNotifier::new(&config.telegram, &config.notify),
        EmailNotifier::new(config.notify.clone()),
    ));
    let logger = HybridLogger::new(db.clone(), notifiers.clone());
    let guard = CostGuard::new(db.clone(), config.cost.clone(), logger.clone());

    let gateway = LlmGateway::new(db.clone(), config.llm.clone(), guard.clone()).await?;
    let prompts = PromptRegistry::new(db.clone());
    prompts.seed_defaults().await?;

    let catalog = CatalogEngine::new(db.clone(), config.search.clone()).await;
    let pipeline = LeadPipeline::new(db.clone(), notifiers.clone(), logger.clone());

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let monitor = InactivityMonitor::new(
        db.clone(),
        pipeline.clone(),
        logger.clone(),
        config.leads.inactivity_threshold_minutes,
        outbound_tx,
    );

    let orchestrator = Orchestrator::new(
        db.clone(),
        ConversationStore::new(db.clone()),
        QueryClassifier::new(gateway.clone(), prompts.clone()),
        catalog.clone(),
        KnowledgeStore::new(db.clone()),
        gateway.clone(),
        prompts.clone(),
        pipeline.clone(),
        logger.clone(),
        Some(monitor.clone()),
    );

    let cancel = shutdown::install_signal_handler();
    let mut tasks = Vec::new();

    // Background workers.
    tasks.push(tokio::spawn(monitor.clone().run(cancel.child_token())));

    match &config.leads.crm_endpoint {
        Some(endpoint) => {
            let crm = Arc::new(HttpCrmClient::new(
                endpoint.clone(),
                config.leads.crm_api_key.clone(),
            ));
            let worker = CrmWorker::new(db.clone(), crm, notifiers.clone(), logger.clone());
            tasks.push(tokio::spawn(worker.run(cancel.child_token())));
        }
        None => {
            warn!("CRM_ENDPOINT not configured, leads stay pending until it is set");
        }
    }

    if config.cost.weekly_usage_report {
        tasks.push(tokio::spawn(run_weekly_report(
            guard.clone(),
            cancel.child_token(),
        )));
    }

    // HTTP surface.
    let telegram_enabled = !config.telegram.disabled && config.telegram.bot_token.is_some();
    let state = AppState {
        db: db.clone(),
        gateway: gateway.clone(),
        catalog: catalog.clone(),
        guard: guard.clone(),
        orchestrator: orchestrator.clone(),
        telegram_enabled,
    };
    let bind_addr = config.gateway.bind_addr.clone();
    let webhook_path = config.gateway.webhook_path.clone();
    let http_cancel = cancel.child_token();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = kiosk_gateway::serve(state, &bind_addr, &webhook_path, http_cancel).await {
            warn!(error = %e, "http gateway exited with error");
        }
    }));

    // Telegram transport, unless this process is API-only.
    if telegram_enabled {
        let token = config
            .telegram
            .bot_token
            .clone()
            .unwrap_or_default();
        let channel = TelegramChannel::new(&token, orchestrator.clone());
        tasks.push(tokio::spawn(channel.run(outbound_rx, cancel.child_token())));
    } else {
        info!("telegram polling disabled, running API-only");
        tasks.push(tokio::spawn(drain_outbound(outbound_rx, cancel.child_token())));
    }

    // Wait for the shutdown signal, then drain.
    cancel.cancelled().await;
    info!("shutting down, draining in-flight work");
    for task in tasks {
        if tokio::time::timeout(DRAIN_TIMEOUT, task).await.is_err() {
            warn!("task did not drain within the timeout");
        }
    }
    logger.shutdown().await;
    db.close().await?;
    info!("kiosk stopped");
    Ok(())
}

/// Consume monitor prompts when no transport is attached, so the queue
/// never backs up.
async fn drain_outbound(
    mut rx: mpsc::Receiver<kiosk_agent::OutboundMessage>,
    cancel: tokio_util::sync::CancellationToken,
) {
    loop {
        tokio::select! {
            message = rx.recv() => {
                match message {
                    Some(outbound) => {
                        warn!(chat_id = outbound.chat_id.as_str(), "dropping outbound prompt: no transport")
                    }
                    None => break,
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

/// Build and activate a catalog version from `file`, then exit.
pub async fn run_index(file: &Path) -> Result<(), KioskError> {
    init_tracing();
    let config = load_config().map_err(|e| KioskError::Config(e.to_string()))?;
    validate(&config)?;

    let db = Database::open(&config.database.url).await?;
    let catalog = CatalogEngine::new(db.clone(), config.search.clone()).await;

    let version = catalog.rebuild_from_file(file).await?;
    println!(
        "indexed {}/{} rows into version {} ({})",
        version.indexed_rows, version.total_rows, version.version_name, version.status
    );

    // Collect superseded versions past the grace period while we are here.
    let removed = catalog.gc_superseded(chrono::Duration::hours(24)).await?;
    if removed > 0 {
        println!("collected {removed} superseded version(s)");
    }

    db.close().await?;
    Ok(())
}

/// Validated configuration for diagnostics in tests.
#[allow(dead_code)]
fn loaded_config_for_tests() -> Result<KioskConfig, KioskError> {
    let config = KioskConfig::default();
    validate(&config)?;
    Ok(config)
}

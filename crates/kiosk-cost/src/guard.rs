// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Monthly usage rollups, threshold alerts, and the LLM kill-switch.
//!
//! The gateway calls [`CostGuard::check`] before every outbound LLM request
//! and [`CostGuard::record`] after every completion. Once monthly usage
//! crosses the configured limit with auto-disable on, `check` fails with
//! `CostLimitExceeded` until an operator calls [`CostGuard::clear`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Datelike, Utc};
use kiosk_config::model::CostConfig;
use kiosk_core::{KioskError, TokenUsage};
use kiosk_logging::HybridLogger;
use kiosk_storage::{queries, Database};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Aggregated view of one month's usage.
#[derive(Debug, Clone, Default)]
pub struct MonthlyUsage {
    pub total_tokens: i64,
    pub total_cost_usd: f64,
}

pub struct CostGuard {
    db: Database,
    config: CostConfig,
    logger: Arc<HybridLogger>,
    killed: AtomicBool,
    /// (year, month) a threshold alert already fired for.
    threshold_alerted: Mutex<Option<(i32, u32)>>,
    /// (year, month) a limit alert already fired for.
    limit_alerted: Mutex<Option<(i32, u32)>>,
}

impl CostGuard {
    pub fn new(db: Database, config: CostConfig, logger: Arc<HybridLogger>) -> Arc<Self> {
        Arc::new(Self {
            db,
            config,
            logger,
            killed: AtomicBool::new(false),
            threshold_alerted: Mutex::new(None),
            limit_alerted: Mutex::new(None),
        })
    }

    /// Fails with `CostLimitExceeded` when the kill-switch is tripped.
    /// Called before any outbound LLM request is issued.
    pub fn check(&self) -> Result<(), KioskError> {
        if self.killed.load(Ordering::Acquire) {
            return Err(KioskError::CostLimitExceeded(
                "monthly LLM budget reached, calls disabled until cleared".into(),
            ));
        }
        Ok(())
    }

    /// True while the kill-switch is tripped.
    pub fn is_tripped(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    /// Operator reset of the kill-switch.
    pub fn clear(&self) {
        self.killed.store(false, Ordering::Release);
        info!("cost kill-switch cleared");
    }

    /// Roll the usage into the monthly aggregate and evaluate thresholds.
    pub async fn record(
        &self,
        provider: &str,
        model: &str,
        usage: TokenUsage,
    ) -> Result<(), KioskError> {
        let now = Utc::now();
        let (year, month) = (now.year(), now.month());
        let price = crate::pricing::price_per_1k(provider, model);

        queries::usage::record_usage(
            &self.db,
            provider,
            model,
            year,
            month,
            usage.total() as i64,
            price,
        )
        .await?;

        let summary = self.monthly_usage(year, month).await?;
        self.evaluate(year, month, &summary).await;
        Ok(())
    }

    /// Totals for one month across providers and models.
    pub async fn monthly_usage(&self, year: i32, month: u32) -> Result<MonthlyUsage, KioskError> {
        let records = queries::usage::monthly_summary(&self.db, year, month).await?;
        let mut usage = MonthlyUsage::default();
        for record in records {
            usage.total_tokens += record.total_tokens;
            usage.total_cost_usd += record.cost();
        }
        Ok(usage)
    }

    async fn evaluate(&self, year: i32, month: u32, summary: &MonthlyUsage) {
        let token_share = summary.total_tokens as f64 / self.config.monthly_token_limit as f64;
        let cost_share = if self.config.monthly_cost_limit_usd > 0.0 {
            summary.total_cost_usd / self.config.monthly_cost_limit_usd
        } else {
            0.0
        };
        let share = token_share.max(cost_share);

        if share >= 1.0 {
            if self.config.auto_disable_on_limit && !self.killed.swap(true, Ordering::AcqRel) {
                warn!("cost kill-switch tripped");
            }
            let mut alerted = self.limit_alerted.lock().await;
            if self.config.alert_enabled && *alerted != Some((year, month)) {
                *alerted = Some((year, month));
                self.logger
                    .critical(
                        &format!(
                            "Monthly AI limit exceeded: {} tokens, ${:.2} ({:.0}% of limit)",
                            summary.total_tokens,
                            summary.total_cost_usd,
                            share * 100.0
                        ),
                        Some(serde_json::json!({
                            "year": year,
                            "month": month,
                            "auto_disabled": self.config.auto_disable_on_limit,
                        })),
                    )
                    .await;
            }
        } else if share >= self.config.alert_threshold {
            let mut alerted = self.threshold_alerted.lock().await;
            if self.config.alert_enabled && *alerted != Some((year, month)) {
                *alerted = Some((year, month));
                self.logger
                    .critical(
                        &format!(
                            "AI usage at {:.0}% of the monthly limit: {} tokens, ${:.2}",
                            share * 100.0,
                            summary.total_tokens,
                            summary.total_cost_usd
                        ),
                        Some(serde_json::json!({"year": year, "month": month})),
                    )
                    .await;
            }
        }
    }

    /// Plain-text usage summary for the weekly report.
    pub async fn usage_report(&self) -> Result<String, KioskError> {
        let now = Utc::now();
        let records = queries::usage::monthly_summary(&self.db, now.year(), now.month()).await?;
        let mut lines = vec![format!(
            "AI usage report for {}-{:02}",
            now.year(),
            now.month()
        )];
        let mut total_tokens = 0i64;
        let mut total_cost = 0f64;
        for record in &records {
            total_tokens += record.total_tokens;
            total_cost += record.cost();
            lines.push(format!(
                "  {}/{}: {} tokens, ${:.2}",
                record.provider,
                record.model,
                record.total_tokens,
                record.cost()
            ));
        }
        lines.push(format!(
            "Total: {} / {} tokens, ${:.2} / ${:.2}",
            total_tokens,
            self.config.monthly_token_limit,
            total_cost,
            self.config.monthly_cost_limit_usd
        ));
        Ok(lines.join("\n"))
    }
}

/// Weekly usage report loop, started when `WEEKLY_USAGE_REPORT=true`.
pub async fn run_weekly_report(guard: Arc<CostGuard>, cancel: CancellationToken) {
    const WEEK: std::time::Duration = std::time::Duration::from_secs(7 * 24 * 60 * 60);
    let mut ticker = tokio::time::interval(WEEK);
    // The first tick fires immediately; skip it so the report lands a week in.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match guard.usage_report().await {
                    Ok(report) => guard.logger.business(&report, None).await,
                    Err(e) => warn!(error = %e, "weekly usage report failed"),
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

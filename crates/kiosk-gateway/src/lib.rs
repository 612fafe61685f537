// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP surface: `GET /health` and the transport webhook.
//!
//! Health checks stay local (database ping, component state) so the
//! endpoint answers fast and never spends LLM tokens. The webhook accepts
//! Telegram-shaped updates and returns the reply in the response body,
//! which is what the planned web widget consumes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use kiosk_agent::orchestrator::SenderProfile;
use kiosk_agent::Orchestrator;
use kiosk_catalog::CatalogEngine;
use kiosk_cost::CostGuard;
use kiosk_llm::LlmGateway;
use kiosk_storage::Database;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub gateway: Arc<LlmGateway>,
    pub catalog: Arc<CatalogEngine>,
    pub guard: Arc<CostGuard>,
    pub orchestrator: Arc<Orchestrator>,
    pub telegram_enabled: bool,
}

/// Build the router with `/health` and the configured webhook path.
pub fn router(state: AppState, webhook_path: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(webhook_path, post(webhook))
        .with_state(state)
}

/// Serve until cancelled.
pub async fn serve(
    state: AppState,
    bind_addr: &str,
    webhook_path: &str,
    cancel: CancellationToken,
) -> Result<(), kiosk_core::KioskError> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| kiosk_core::KioskError::Config(format!("cannot bind {bind_addr}: {e}")))?;
    info!(bind_addr, "http gateway listening");
    axum::serve(listener, router(state, webhook_path))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| kiosk_core::KioskError::Internal(format!("http server failed: {e}")))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    components: serde_json::Value,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database_ok = state
        .db
        .connection()
        .call(|conn| {
            conn.execute_batch("SELECT 1;")?;
            Ok(())
        })
        .await
        .is_ok();

    let catalog_ready = state.catalog.is_ready();
    let cost_tripped = state.guard.is_tripped();

    let components = serde_json::json!({
        "llm": {
            "provider": state.gateway.active_provider_name(),
            "status": if cost_tripped { "degraded" } else { "ok" },
        },
        "catalog": {
            "status": if catalog_ready { "ok" } else { "degraded" },
            "active_version": state.catalog.active_version_name(),
        },
        "telegram": {
            "status": if state.telegram_enabled { "ok" } else { "disabled" },
        },
    });

    let (status, database, code) = if !database_ok {
        ("unhealthy", "down", StatusCode::SERVICE_UNAVAILABLE)
    } else if !catalog_ready || cost_tripped {
        ("degraded", "ok", StatusCode::OK)
    } else {
        ("healthy", "ok", StatusCode::OK)
    };

    (
        code,
        Json(HealthResponse {
            status,
            database,
            components,
        }),
    )
}

/// The subset of a Telegram update the webhook needs.
#[derive(Debug, Deserialize)]
struct WebhookUpdate {
    message: Option<WebhookMessage>,
}

#[derive(Debug, Deserialize)]
struct WebhookMessage {
    chat: WebhookChat,
    text: Option<String>,
    from: Option<WebhookUser>,
}

#[derive(Debug, Deserialize)]
struct WebhookChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WebhookUser {
    first_name: Option<String>,
    last_name: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Serialize)]
struct WebhookResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    suggested_actions: Vec<String>,
}

async fn webhook(
    State(state): State<AppState>,
    Json(update): Json<WebhookUpdate>,
) -> (StatusCode, Json<WebhookResponse>) {
    let Some(message) = update.message else {
        return (
            StatusCode::OK,
            Json(WebhookResponse {
                ok: true,
                reply: None,
                suggested_actions: vec![],
            }),
        );
    };
    let Some(text) = message.text else {
        return (
            StatusCode::OK,
            Json(WebhookResponse {
                ok: true,
                reply: None,
                suggested_actions: vec![],
            }),
        );
    };

    let profile = match message.from {
        Some(from) => SenderProfile {
            first_name: from.first_name,
            last_name: from.last_name,
            username: from.username,
        },
        None => SenderProfile::default(),
    };

    match state
        .orchestrator
        .handle_turn(&message.chat.id.to_string(), "webhook", &text, &profile)
        .await
    {
        Ok(reply) => (
            StatusCode::OK,
            Json(WebhookResponse {
                ok: true,
                reply: Some(reply.text),
                suggested_actions: reply.suggested_actions,
            }),
        ),
        Err(e) => {
            warn!(error = %e, "webhook turn failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WebhookResponse {
                    ok: false,
                    reply: None,
                    suggested_actions: vec![],
                }),
            )
        }
    }
}

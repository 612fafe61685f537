// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The provider gateway: hot-swappable provider reference, retry policy,
//! and cost accounting.
//!
//! Retry policy: transient failures (network, timeout, 429, 5xx) back off
//! exponentially from 500ms with factor 2, capped at 4s, for at most three
//! attempts. Auth errors surface immediately. The cost guard's kill-switch
//! is checked before any outbound request.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use kiosk_config::model::LlmConfig;
use kiosk_core::{HealthStatus, KioskError};
use kiosk_cost::CostGuard;
use kiosk_storage::{queries, Database};
use tracing::{debug, info, warn};

use crate::openai::OpenAiProvider;
use crate::prompts::render;
use crate::provider::{ChatMessage, LlmProvider, LlmResponse};
use crate::yandex::YandexProvider;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(4);

/// Per-attempt wall clock, on top of the provider's own HTTP timeout.
const ATTEMPT_DEADLINE: Duration = Duration::from_secs(30);

fn backoff_delay(attempt: u32) -> Duration {
    BACKOFF_BASE
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(BACKOFF_CAP)
}

/// Optional per-provider overrides stored in the `llm_settings` config blob.
#[derive(Debug, Default, serde::Deserialize)]
struct ProviderOverrides {
    api_key: Option<String>,
    model: Option<String>,
    folder_id: Option<String>,
    base_url: Option<String>,
}

/// Build a provider instance from its id, optional stored overrides, and
/// the environment-level defaults.
pub fn build_provider(
    provider_id: &str,
    config_json: Option<&str>,
    llm: &LlmConfig,
) -> Result<Arc<dyn LlmProvider>, KioskError> {
    let overrides: ProviderOverrides = match config_json {
        Some(json) => serde_json::from_str(json)
            .map_err(|e| KioskError::Config(format!("bad llm_settings config blob: {e}")))?,
        None => ProviderOverrides::default(),
    };

    match provider_id {
        "openai" => {
            let api_key = overrides
                .api_key
                .or_else(|| llm.openai_api_key.clone())
                .ok_or_else(|| KioskError::Config("OPENAI_API_KEY is not set".into()))?;
            let model = overrides
                .model
                .unwrap_or_else(|| llm.openai_default_model.clone());
            let mut provider = OpenAiProvider::new(api_key, model);
            if let Some(base_url) = overrides.base_url {
                provider = provider.with_base_url(base_url);
            }
            Ok(Arc::new(provider))
        }
        "yandex" => {
            let api_key = overrides
                .api_key
                .or_else(|| llm.yandex_api_key.clone())
                .ok_or_else(|| KioskError::Config("YANDEX_API_KEY is not set".into()))?;
            let folder_id = overrides
                .folder_id
                .or_else(|| llm.yandex_folder_id.clone())
                .ok_or_else(|| KioskError::Config("YANDEX_FOLDER_ID is not set".into()))?;
            let model = overrides
                .model
                .unwrap_or_else(|| llm.yandex_default_model.clone());
            let mut provider = YandexProvider::new(api_key, folder_id, model);
            if let Some(base_url) = overrides.base_url {
                provider = provider.with_base_url(base_url);
            }
            Ok(Arc::new(provider))
        }
        other => Err(KioskError::Config(format!("unknown LLM provider {other:?}"))),
    }
}

/// Uniform call surface over the pluggable providers.
///
/// The active provider lives behind a read-mostly lock; switching providers
/// replaces the Arc atomically while in-flight calls finish on the old one.
pub struct LlmGateway {
    db: Database,
    config: LlmConfig,
    guard: Arc<CostGuard>,
    active: RwLock<Arc<dyn LlmProvider>>,
}

impl LlmGateway {
    /// Resolve the active provider (database row, falling back to the
    /// environment default) and construct the gateway.
    pub async fn new(
        db: Database,
        config: LlmConfig,
        guard: Arc<CostGuard>,
    ) -> Result<Arc<Self>, KioskError> {
        let provider = Self::resolve_provider(&db, &config).await?;
        info!(provider = provider.name(), model = provider.model(), "llm gateway ready");
        Ok(Arc::new(Self {
            db,
            config,
            guard,
            active: RwLock::new(provider),
        }))
    }

    async fn resolve_provider(
        db: &Database,
        config: &LlmConfig,
    ) -> Result<Arc<dyn LlmProvider>, KioskError> {
        match queries::settings::active_provider(db).await? {
            Some((provider_id, config_json)) => {
                build_provider(&provider_id, Some(&config_json), config)
            }
            None => build_provider(&config.default_provider, None, config),
        }
    }

    fn provider(&self) -> Arc<dyn LlmProvider> {
        match self.active.read() {
            Ok(active) => active.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store_provider(&self, provider: Arc<dyn LlmProvider>) {
        match self.active.write() {
            Ok(mut active) => *active = provider,
            Err(poisoned) => *poisoned.into_inner() = provider,
        }
    }

    /// Name of the provider currently serving calls.
    pub fn active_provider_name(&self) -> String {
        self.provider().name().to_string()
    }

    /// Re-resolve the active provider from storage. Takes effect without a
    /// restart; in-flight calls complete on the provider they started with.
    pub async fn reload(&self) -> Result<(), KioskError> {
        let provider = Self::resolve_provider(&self.db, &self.config).await?;
        info!(provider = provider.name(), "llm provider reloaded");
        self.store_provider(provider);
        Ok(())
    }

    /// Persist a new active provider selection and hot-swap to it.
    pub async fn switch_provider(
        &self,
        provider_id: &str,
        config_json: &str,
    ) -> Result<(), KioskError> {
        // Build first so a bad config never dethrones the working provider.
        let provider = build_provider(provider_id, Some(config_json), &self.config)?;
        queries::settings::set_active_provider(&self.db, provider_id, config_json).await?;
        self.store_provider(provider);
        info!(provider = provider_id, "llm provider switched");
        Ok(())
    }

    /// Generate an assistant reply from a system prompt, bounded history,
    /// and the current user prompt.
    pub async fn generate(
        &self,
        system: &str,
        history: Vec<ChatMessage>,
        user_prompt: &str,
    ) -> Result<LlmResponse, KioskError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(history);
        messages.push(ChatMessage::user(user_prompt));
        self.complete(&messages, 0.7, 1000).await
    }

    /// Map an utterance onto one of `labels` using the given classification
    /// prompt template (placeholders `{query}` and `{labels}`).
    pub async fn classify(
        &self,
        text: &str,
        labels: &[&str],
        prompt_template: &str,
    ) -> Result<String, KioskError> {
        let prompt = render(
            prompt_template,
            &[("query", text), ("labels", &labels.join(", "))],
        );
        let response = self
            .complete(&[ChatMessage::user(prompt)], 0.1, 50)
            .await?;
        let label = response.content.trim().to_uppercase();
        if labels.contains(&label.as_str()) {
            Ok(label)
        } else {
            Err(KioskError::Internal(format!(
                "classifier returned unknown label {label:?}"
            )))
        }
    }

    /// Health of the active provider.
    pub async fn health(&self) -> HealthStatus {
        self.provider().health().await
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<LlmResponse, KioskError> {
        self.guard.check()?;
        let provider = self.provider();

        let mut last_error = None;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let delay = backoff_delay(attempt - 1);
                warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying llm call");
                tokio::time::sleep(delay).await;
            }

            let call = provider.generate(messages, temperature, max_tokens);
            let result = match tokio::time::timeout(ATTEMPT_DEADLINE, call).await {
                Ok(result) => result,
                Err(_) => Err(KioskError::Timeout {
                    duration: ATTEMPT_DEADLINE,
                }),
            };

            match result {
                Ok(response) => {
                    debug!(
                        provider = response.provider.as_str(),
                        prompt_tokens = response.usage.prompt_tokens,
                        completion_tokens = response.usage.completion_tokens,
                        "llm completion"
                    );
                    self.guard
                        .record(provider.name(), provider.model(), response.usage)
                        .await?;
                    return Ok(response);
                }
                Err(e) if e.is_transient() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            KioskError::transient("llm", "completion failed after retries")
        }))
    }
}

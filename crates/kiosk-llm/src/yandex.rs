// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! YandexGPT foundation-models provider.
//!
//! The completion API addresses models as `gpt://<folder_id>/<model>` and
//! reports token counts as strings.

use std::time::Duration;

use async_trait::async_trait;
use kiosk_core::{HealthStatus, KioskError, TokenUsage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::openai::{map_request_error, map_status_error};
use crate::provider::{ChatMessage, LlmProvider, LlmResponse};

const DEFAULT_BASE_URL: &str = "https://llm.api.cloud.yandex.net/foundationModels/v1";

const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct YandexProvider {
    api_key: String,
    folder_id: String,
    model: String,
    base_url: String,
}

impl YandexProvider {
    pub fn new(api_key: String, folder_id: String, model: String) -> Self {
        Self {
            api_key,
            folder_id,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (tests).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest {
    model_uri: String,
    completion_options: CompletionOptions,
    messages: Vec<ApiMessage>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionOptions {
    stream: bool,
    temperature: f32,
    max_tokens: String,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    text: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    result: CompletionResult,
}

#[derive(Deserialize)]
struct CompletionResult {
    alternatives: Vec<Alternative>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct Alternative {
    message: AlternativeMessage,
}

#[derive(Deserialize)]
struct AlternativeMessage {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ApiUsage {
    #[serde(default)]
    input_text_tokens: Option<String>,
    #[serde(default)]
    completion_tokens: Option<String>,
}

fn parse_tokens(value: &Option<String>) -> u32 {
    value
        .as_deref()
        .and_then(|v| v.parse().ok())
        .unwrap_or_default()
}

#[async_trait]
impl LlmProvider for YandexProvider {
    fn name(&self) -> &str {
        "yandex"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<LlmResponse, KioskError> {
        let request = CompletionRequest {
            model_uri: format!("gpt://{}/{}", self.folder_id, self.model),
            completion_options: CompletionOptions {
                stream: false,
                temperature,
                max_tokens: max_tokens.to_string(),
            },
            messages: messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.to_string(),
                    text: m.content.clone(),
                })
                .collect(),
        };

        let client = reqwest::Client::builder()
            .timeout(ATTEMPT_TIMEOUT)
            .build()
            .map_err(|e| KioskError::Internal(format!("failed to build HTTP client: {e}")))?;

        let response = client
            .post(format!("{}/completion", self.base_url))
            .header("Authorization", format!("Api-Key {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        debug!(status = %status, "yandex completion response");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error("yandex", status, &body));
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            KioskError::transient("yandex", format!("failed to parse response: {e}"))
        })?;

        let alternative = parsed.result.alternatives.into_iter().next().ok_or_else(|| {
            KioskError::transient("yandex", "no alternatives in completion response")
        })?;
        let usage = parsed.result.usage.unwrap_or_default();

        Ok(LlmResponse {
            content: alternative.message.text,
            provider: self.name().to_string(),
            model: self.model.clone(),
            usage: TokenUsage {
                prompt_tokens: parse_tokens(&usage.input_text_tokens),
                completion_tokens: parse_tokens(&usage.completion_tokens),
            },
        })
    }

    async fn health(&self) -> HealthStatus {
        let messages = [ChatMessage::user("ping")];
        let probe = self.generate(&messages, 0.0, 1);
        match tokio::time::timeout(Duration::from_secs(10), probe).await {
            Ok(Ok(_)) => HealthStatus::Healthy,
            Ok(Err(e)) => HealthStatus::Unhealthy(e.to_string()),
            Err(_) => HealthStatus::Degraded("health probe timed out".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str) -> YandexProvider {
        YandexProvider::new("yc-key".into(), "b1folder".into(), "yandexgpt-lite".into())
            .with_base_url(base_url.to_string())
    }

    fn completion_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "result": {
                "alternatives": [{"message": {"role": "assistant", "text": text}, "status": "ALTERNATIVE_STATUS_FINAL"}],
                "usage": {"inputTextTokens": "9", "completionTokens": "4", "totalTokens": "13"},
                "modelVersion": "latest"
            }
        })
    }

    #[tokio::test]
    async fn generate_builds_model_uri_and_parses_string_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/completion"))
            .and(header("authorization", "Api-Key yc-key"))
            .and(body_partial_json(serde_json::json!({
                "modelUri": "gpt://b1folder/yandexgpt-lite"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Привет!")))
            .mount(&server)
            .await;

        let response = provider(&server.uri())
            .generate(&[ChatMessage::user("привет")], 0.7, 100)
            .await
            .unwrap();
        assert_eq!(response.content, "Привет!");
        assert_eq!(response.usage.prompt_tokens, 9);
        assert_eq!(response.usage.completion_tokens, 4);
    }

    #[tokio::test]
    async fn empty_alternatives_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/completion"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {"alternatives": [], "modelVersion": "latest"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .generate(&[ChatMessage::user("hi")], 0.7, 100)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn forbidden_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/completion"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .generate(&[ChatMessage::user("hi")], 0.7, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, KioskError::PermanentExternal { .. }));
    }
}

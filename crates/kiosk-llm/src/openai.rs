// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible chat completions provider.
//!
//! The HTTP client is built inside each call and released on every exit
//! path; the gateway owns retries, so one call means one attempt.

use std::time::Duration;

use async_trait::async_trait;
use kiosk_core::{HealthStatus, KioskError, TokenUsage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::provider::{ChatMessage, LlmProvider, LlmResponse};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Timeout for a single completion attempt.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct OpenAiProvider {
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (self-hosted gateways, tests).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
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
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature,
            max_tokens,
        };

        let client = reqwest::Client::builder()
            .timeout(ATTEMPT_TIMEOUT)
            .build()
            .map_err(|e| KioskError::Internal(format!("failed to build HTTP client: {e}")))?;

        let response = client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        debug!(status = %status, "openai completion response");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error("openai", status, &body));
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            KioskError::transient("openai", format!("failed to parse response: {e}"))
        })?;

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        let usage = parsed.usage.unwrap_or_default();

        Ok(LlmResponse {
            content,
            provider: self.name().to_string(),
            model: self.model.clone(),
            usage: TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
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

/// Map a reqwest transport error onto the error taxonomy.
pub(crate) fn map_request_error(e: reqwest::Error) -> KioskError {
    if e.is_timeout() {
        KioskError::Timeout {
            duration: ATTEMPT_TIMEOUT,
        }
    } else {
        KioskError::TransientExternal {
            service: "llm".into(),
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

/// Map an HTTP error status onto the error taxonomy: auth and client errors
/// are permanent, 429 and 5xx are transient.
pub(crate) fn map_status_error(
    service: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> KioskError {
    let message = format!("API returned {status}: {body}");
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        KioskError::transient(service, message)
    } else {
        KioskError::permanent(service, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str) -> OpenAiProvider {
        OpenAiProvider::new("sk-test".into(), "gpt-4o-mini".into())
            .with_base_url(base_url.to_string())
    }

    fn completion_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": text}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19}
        })
    }

    #[tokio::test]
    async fn generate_returns_text_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Здравствуйте!")))
            .mount(&server)
            .await;

        let response = provider(&server.uri())
            .generate(&[ChatMessage::user("привет")], 0.7, 100)
            .await
            .unwrap();
        assert_eq!(response.content, "Здравствуйте!");
        assert_eq!(response.usage.prompt_tokens, 12);
        assert_eq!(response.usage.completion_tokens, 7);
        assert_eq!(response.provider, "openai");
    }

    #[tokio::test]
    async fn auth_failure_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .generate(&[ChatMessage::user("hi")], 0.7, 100)
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(matches!(err, KioskError::PermanentExternal { .. }));
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .generate(&[ChatMessage::user("hi")], 0.7, 100)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn rate_limit_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .generate(&[ChatMessage::user("hi")], 0.7, 100)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}

// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The provider capability interface implemented by each LLM vendor.

use async_trait::async_trait;
use kiosk_core::{HealthStatus, KioskError, Role, TokenUsage};

/// One chat message handed to a provider.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completed generation with its token accounting.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub usage: TokenUsage,
}

/// Capability surface every LLM vendor integration implements.
///
/// Implementations perform exactly one attempt per call; the gateway owns
/// the retry policy.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stable provider id ("openai", "yandex").
    fn name(&self) -> &str;

    /// Model identifier requests are issued against.
    fn model(&self) -> &str;

    /// Generate a completion for the given messages.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<LlmResponse, KioskError>;

    /// Cheap reachability probe.
    async fn health(&self) -> HealthStatus;
}

// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM provider gateway and prompt registry.
//!
//! The gateway is the sole place an LLM call is issued: it owns the active
//! provider reference, the retry policy, the cost guard hookup, and prompt
//! composition helpers. Providers are pluggable behind [`LlmProvider`].

pub mod gateway;
pub mod openai;
pub mod prompts;
pub mod provider;
pub mod yandex;

pub use gateway::LlmGateway;
pub use prompts::PromptRegistry;
pub use provider::{ChatMessage, LlmProvider, LlmResponse};

// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Kiosk conversational commerce agent.

use thiserror::Error;

/// The primary error type used across all Kiosk crates.
#[derive(Debug, Error)]
pub enum KioskError {
    /// Configuration errors (missing required keys, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Bad input from a user or operator; recovered locally by asking for a correction.
    #[error("validation error: {0}")]
    Validation(String),

    /// A requested entity is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// An unknown prompt name was fetched from the registry.
    #[error("prompt not found: {0}")]
    PromptNotFound(String),

    /// The embedding model could not be loaded.
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// Network, timeout, or 5xx failure from an external service; retried per policy.
    #[error("transient error from {service}: {message}")]
    TransientExternal {
        service: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Auth, quota, or other 4xx failure from an external service; never retried.
    #[error("permanent error from {service}: {message}")]
    PermanentExternal { service: String, message: String },

    /// The cost kill-switch is tripped; LLM calls fail fast until cleared.
    #[error("cost limit exceeded: {0}")]
    CostLimitExceeded(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KioskError {
    /// Shorthand for a transient external failure without an underlying source.
    pub fn transient(service: impl Into<String>, message: impl Into<String>) -> Self {
        KioskError::TransientExternal {
            service: service.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a permanent external failure.
    pub fn permanent(service: impl Into<String>, message: impl Into<String>) -> Self {
        KioskError::PermanentExternal {
            service: service.into(),
            message: message.into(),
        }
    }

    /// True when the retry policy may attempt the operation again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            KioskError::TransientExternal { .. } | KioskError::Timeout { .. }
        )
    }
}

// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common domain types shared across the Kiosk crates.
//!
//! Timestamps are ISO 8601 UTC strings with millisecond precision, stored
//! as TEXT. Enum-like columns are stored with their serialized names so the
//! database stays readable from the sqlite shell.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Token counts reported by an LLM provider for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Health status reported by component health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Component is fully operational.
    Healthy,
    /// Component is operational but experiencing issues.
    Degraded(String),
    /// Component is not operational.
    Unhealthy(String),
}

/// Message author role within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Parse a stored role, defaulting to `User` for unknown values.
    pub fn from_str_value(value: &str) -> Self {
        value.parse().unwrap_or(Role::User)
    }
}

/// Intent tag produced by the query classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    /// Search for a specific product.
    Product,
    /// Question about company services.
    Service,
    /// Question about the company itself.
    CompanyInfo,
    /// The user wants to reach a manager.
    Contact,
    /// Everything else.
    General,
}

/// A platform user, identified by the platform-agnostic `chat_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Stable handle across transports. Not the Telegram user id.
    pub chat_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: String,
}

/// An ordered sequence of messages scoped to a `chat_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub chat_id: String,
    /// Transport the conversation came in on (e.g. "telegram").
    pub platform: String,
    /// "open" or "ended". A user has at most one open conversation.
    pub status: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub metadata: Option<String>,
}

/// A single message within a conversation. Strictly append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    /// Optional JSON blob (intent tag, retrieval stats, token usage).
    pub metadata: Option<String>,
    pub created_at: String,
}

/// A catalog row as indexed by the vector engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub product_name: String,
    pub category_1: String,
    pub article: String,
    pub description: Option<String>,
    pub category_2: Option<String>,
    pub category_3: Option<String>,
    pub photo_url: Option<String>,
    pub page_url: Option<String>,
}

impl Product {
    /// Text embedded for this product: name, description, the category path
    /// and the article, blank fields skipped, single-space separated.
    pub fn search_text(&self) -> String {
        let mut parts: Vec<&str> = vec![&self.product_name];
        if let Some(d) = self.description.as_deref() {
            parts.push(d);
        }
        parts.push(&self.category_1);
        if let Some(c) = self.category_2.as_deref() {
            parts.push(c);
        }
        if let Some(c) = self.category_3.as_deref() {
            parts.push(c);
        }
        parts.push(&self.article);
        parts
            .into_iter()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A product together with its post-boost relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredProduct {
    pub product: Product,
    /// Post-boost score in [0, 1.5]; what results are ranked by.
    pub score: f32,
    /// Raw cosine score in [0, 1] before boosting; used for tie-breaks.
    pub raw_score: f32,
}

/// Lifecycle status of a catalog index version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum VersionStatus {
    Building,
    Active,
    Superseded,
    Failed,
}

/// One blue-green catalog build. At most one version is `active` at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogVersion {
    pub version_name: String,
    pub status: VersionStatus,
    pub total_rows: i64,
    pub indexed_rows: i64,
    pub created_at: String,
    pub activated_at: Option<String>,
}

/// A company service looked up by keyword or category. Not vectorized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyService {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub keywords: Vec<String>,
    pub active: bool,
}

/// CRM synchronization status of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum LeadStatus {
    #[strum(serialize = "pending_sync")]
    PendingSync,
    #[strum(serialize = "synced")]
    Synced,
    #[strum(serialize = "failed")]
    Failed,
}

impl LeadStatus {
    /// Parse a stored status, defaulting to `PendingSync` for unknown values.
    pub fn from_str_value(value: &str) -> Self {
        value.parse().unwrap_or(LeadStatus::PendingSync)
    }
}

/// First communication channel reported to the CRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum LeadSource {
    #[strum(serialize = "TG")]
    Telegram,
    #[strum(serialize = "SalesIQ Chat")]
    SalesIqChat,
}

/// A captured prospect carrying delivery state toward the CRM.
///
/// Invariants: `last_name` non-empty, at least one of phone/email present,
/// `sync_attempts <= 2`, and `status == Synced` implies `crm_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub chat_id: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub whatsapp: Option<String>,
    pub company: Option<String>,
    pub question: String,
    pub source: LeadSource,
    pub status: LeadStatus,
    pub sync_attempts: i32,
    pub last_attempt_at: Option<String>,
    pub crm_id: Option<String>,
    pub auto_created: bool,
    pub created_at: String,
}

impl Lead {
    pub fn has_contact(&self) -> bool {
        self.phone.is_some() || self.email.is_some()
    }
}

/// A versioned named prompt. Per name, exactly one version is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    pub content: String,
    pub version: i64,
    pub active: bool,
    pub role: Role,
}

/// Monthly token usage rollup per provider and model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub provider: String,
    pub model: String,
    pub year: i32,
    pub month: u32,
    pub total_tokens: i64,
    pub price_per_1k: f64,
    pub currency: String,
}

impl UsageRecord {
    /// Cost of the rolled-up tokens at the recorded per-1k price.
    pub fn cost(&self) -> f64 {
        self.total_tokens as f64 / 1000.0 * self.price_per_1k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(description: Option<&str>, category_2: Option<&str>) -> Product {
        Product {
            id: "P-001".into(),
            product_name: "Ноутбук бизнес-класса".into(),
            category_1: "Электроника".into(),
            article: "DL001".into(),
            description: description.map(String::from),
            category_2: category_2.map(String::from),
            category_3: None,
            photo_url: None,
            page_url: None,
        }
    }

    #[test]
    fn search_text_skips_blank_fields() {
        let text = product(None, None).search_text();
        assert_eq!(text, "Ноутбук бизнес-класса Электроника DL001");
    }

    #[test]
    fn search_text_joins_all_present_fields() {
        let text = product(Some("14 дюймов"), Some("Ноутбуки")).search_text();
        assert_eq!(
            text,
            "Ноутбук бизнес-класса 14 дюймов Электроника Ноутбуки DL001"
        );
    }

    #[test]
    fn intent_round_trips_through_screaming_case() {
        assert_eq!(Intent::Product.to_string(), "PRODUCT");
        assert_eq!(Intent::CompanyInfo.to_string(), "COMPANY_INFO");
        assert_eq!("CONTACT".parse::<Intent>().unwrap(), Intent::Contact);
        assert!("BOGUS".parse::<Intent>().is_err());
    }

    #[test]
    fn lead_status_defaults_to_pending() {
        assert_eq!(LeadStatus::from_str_value("synced"), LeadStatus::Synced);
        assert_eq!(
            LeadStatus::from_str_value("garbage"),
            LeadStatus::PendingSync
        );
    }

    #[test]
    fn lead_source_uses_crm_wire_names() {
        assert_eq!(LeadSource::Telegram.to_string(), "TG");
        assert_eq!(LeadSource::SalesIqChat.to_string(), "SalesIQ Chat");
    }

    #[test]
    fn usage_record_cost() {
        let rec = UsageRecord {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            year: 2026,
            month: 3,
            total_tokens: 2_000_000,
            price_per_1k: 0.00015,
            currency: "USD".into(),
        };
        assert!((rec.cost() - 0.3).abs() < 1e-9);
    }
}

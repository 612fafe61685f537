// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All sections default to sensible values so a bare environment still
//! produces a loadable (if not very useful) configuration. Unknown keys are
//! rejected at startup via `#[serde(deny_unknown_fields)]`.

use serde::{Deserialize, Serialize};

/// Top-level Kiosk configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KioskConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub cost: CostConfig,

    #[serde(default)]
    pub leads: LeadsConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Telegram transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot API token. `None` disables the transport entirely.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// When true the process exposes the HTTP API only; the long-polling
    /// loop is not started.
    #[serde(default)]
    pub disabled: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            disabled: false,
        }
    }
}

/// Transactional store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "kiosk.db".to_string()
}

/// LLM provider credentials and defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Fallback provider when none is active in the database: "openai" | "yandex".
    #[serde(default = "default_provider")]
    pub default_provider: String,

    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_openai_model")]
    pub openai_default_model: String,

    #[serde(default)]
    pub yandex_api_key: Option<String>,

    #[serde(default)]
    pub yandex_folder_id: Option<String>,

    #[serde(default = "default_yandex_model")]
    pub yandex_default_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            openai_api_key: None,
            openai_default_model: default_openai_model(),
            yandex_api_key: None,
            yandex_folder_id: None,
            yandex_default_model: default_yandex_model(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_yandex_model() -> String {
    "yandexgpt-lite".to_string()
}

/// Vector catalog engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Root directory for per-version vector index storage.
    #[serde(default = "default_persist_dir")]
    pub persist_dir: String,

    /// Directory where uploaded catalog files land.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// Qualified embedding model identifier ("org/name").
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Post-boost score floor; candidates below it are dropped.
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Additive boost when the query is a substring of the product name.
    #[serde(default = "default_name_boost")]
    pub name_boost: f32,

    /// Additive boost when the query is a substring of the article.
    /// Must exceed `name_boost`.
    #[serde(default = "default_article_boost")]
    pub article_boost: f32,

    /// Maximum number of results returned by a search.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            persist_dir: default_persist_dir(),
            upload_dir: default_upload_dir(),
            embedding_model: default_embedding_model(),
            min_score: default_min_score(),
            name_boost: default_name_boost(),
            article_boost: default_article_boost(),
            max_results: default_max_results(),
        }
    }
}

fn default_persist_dir() -> String {
    "data/chroma".to_string()
}

fn default_upload_dir() -> String {
    "data/uploads".to_string()
}

fn default_embedding_model() -> String {
    "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2".to_string()
}

fn default_min_score() -> f32 {
    0.45
}

fn default_name_boost() -> f32 {
    0.20
}

fn default_article_boost() -> f32 {
    0.30
}

fn default_max_results() -> usize {
    10
}

/// Cost guard thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CostConfig {
    #[serde(default = "default_token_limit")]
    pub monthly_token_limit: i64,

    #[serde(default = "default_cost_limit")]
    pub monthly_cost_limit_usd: f64,

    /// Fraction of the monthly limit at which a warning alert fires.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,

    /// Trip the kill-switch when the monthly limit is reached.
    #[serde(default)]
    pub auto_disable_on_limit: bool,

    #[serde(default = "default_true")]
    pub alert_enabled: bool,

    #[serde(default)]
    pub weekly_usage_report: bool,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            monthly_token_limit: default_token_limit(),
            monthly_cost_limit_usd: default_cost_limit(),
            alert_threshold: default_alert_threshold(),
            auto_disable_on_limit: false,
            alert_enabled: true,
            weekly_usage_report: false,
        }
    }
}

fn default_token_limit() -> i64 {
    10_000_000
}

fn default_cost_limit() -> f64 {
    100.0
}

fn default_alert_threshold() -> f64 {
    0.8
}

fn default_true() -> bool {
    true
}

/// Lead pipeline and CRM delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LeadsConfig {
    /// Minutes of user inactivity before lead qualification triggers.
    #[serde(default = "default_inactivity_minutes")]
    pub inactivity_threshold_minutes: i64,

    /// CRM API base URL. `None` disables delivery (leads stay pending).
    #[serde(default)]
    pub crm_endpoint: Option<String>,

    #[serde(default)]
    pub crm_api_key: Option<String>,
}

impl Default for LeadsConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold_minutes: default_inactivity_minutes(),
            crm_endpoint: None,
            crm_api_key: None,
        }
    }
}

fn default_inactivity_minutes() -> i64 {
    120
}

/// Notification targets for managers and administrators.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    /// Group chat that receives new-lead notifications.
    #[serde(default)]
    pub manager_telegram_chat_id: Option<String>,

    /// Comma-separated Telegram ids that receive CRITICAL alerts.
    #[serde(default)]
    pub admin_telegram_ids: String,

    /// Comma-separated manager email addresses.
    #[serde(default)]
    pub manager_emails: String,

    #[serde(default)]
    pub smtp_host: Option<String>,

    #[serde(default)]
    pub smtp_user: Option<String>,

    #[serde(default)]
    pub smtp_password: Option<String>,

    /// Public base URL used in notification links.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl NotifyConfig {
    /// Parsed admin Telegram ids, skipping malformed entries.
    pub fn admin_ids(&self) -> Vec<i64> {
        self.admin_telegram_ids
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    }

    /// Parsed manager email list.
    pub fn manager_email_list(&self) -> Vec<String> {
        self.manager_emails
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn smtp_configured(&self) -> bool {
        self.smtp_host.is_some() && self.smtp_user.is_some() && self.smtp_password.is_some()
    }
}

/// HTTP surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Path the Telegram webhook is served on.
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            webhook_path: default_webhook_path(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_webhook_path() -> String {
    "/webhook/telegram".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_search_knobs() {
        let config = KioskConfig::default();
        assert!((config.search.min_score - 0.45).abs() < f32::EPSILON);
        assert!((config.search.name_boost - 0.20).abs() < f32::EPSILON);
        assert!((config.search.article_boost - 0.30).abs() < f32::EPSILON);
        assert_eq!(config.search.max_results, 10);
    }

    #[test]
    fn admin_ids_skip_garbage() {
        let notify = NotifyConfig {
            admin_telegram_ids: "123, abc, 456 ,".to_string(),
            ..NotifyConfig::default()
        };
        assert_eq!(notify.admin_ids(), vec![123, 456]);
    }

    #[test]
    fn manager_email_list_trims() {
        let notify = NotifyConfig {
            manager_emails: " sales@example.com ,ops@example.com,".to_string(),
            ..NotifyConfig::default()
        };
        assert_eq!(
            notify.manager_email_list(),
            vec!["sales@example.com".to_string(), "ops@example.com".to_string()]
        );
    }

    #[test]
    fn smtp_requires_all_three_fields() {
        let mut notify = NotifyConfig {
            smtp_host: Some("smtp.example.com".into()),
            smtp_user: Some("bot".into()),
            ..NotifyConfig::default()
        };
        assert!(!notify.smtp_configured());
        notify.smtp_password = Some("secret".into());
        assert!(notify.smtp_configured());
    }
}

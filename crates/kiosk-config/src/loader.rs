// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader merging compiled defaults, an optional local TOML
//! file, and the documented environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::KioskConfig;

/// The documented environment keys and the config paths they map to.
///
/// Keys are matched verbatim (upper case); everything else in the process
/// environment is ignored so unrelated variables cannot collide with
/// `deny_unknown_fields`.
const ENV_KEYS: &[(&str, &str)] = &[
    ("BOT_TOKEN", "telegram.bot_token"),
    ("DISABLE_TELEGRAM_BOT", "telegram.disabled"),
    ("DATABASE_URL", "database.url"),
    ("DEFAULT_LLM_PROVIDER", "llm.default_provider"),
    ("OPENAI_API_KEY", "llm.openai_api_key"),
    ("OPENAI_DEFAULT_MODEL", "llm.openai_default_model"),
    ("YANDEX_API_KEY", "llm.yandex_api_key"),
    ("YANDEX_FOLDER_ID", "llm.yandex_folder_id"),
    ("YANDEX_DEFAULT_MODEL", "llm.yandex_default_model"),
    ("CHROMA_PERSIST_DIR", "search.persist_dir"),
    ("UPLOAD_DIR", "search.upload_dir"),
    ("EMBEDDING_MODEL", "search.embedding_model"),
    ("SEARCH_MIN_SCORE", "search.min_score"),
    ("SEARCH_NAME_BOOST", "search.name_boost"),
    ("SEARCH_ARTICLE_BOOST", "search.article_boost"),
    ("SEARCH_MAX_RESULTS", "search.max_results"),
    ("MONTHLY_TOKEN_LIMIT", "cost.monthly_token_limit"),
    ("MONTHLY_COST_LIMIT_USD", "cost.monthly_cost_limit_usd"),
    ("COST_ALERT_THRESHOLD", "cost.alert_threshold"),
    ("AUTO_DISABLE_ON_LIMIT", "cost.auto_disable_on_limit"),
    ("COST_ALERT_ENABLED", "cost.alert_enabled"),
    ("WEEKLY_USAGE_REPORT", "cost.weekly_usage_report"),
    ("LEAD_INACTIVITY_THRESHOLD", "leads.inactivity_threshold_minutes"),
    ("CRM_ENDPOINT", "leads.crm_endpoint"),
    ("CRM_API_KEY", "leads.crm_api_key"),
    ("MANAGER_TELEGRAM_CHAT_ID", "notify.manager_telegram_chat_id"),
    ("ADMIN_TELEGRAM_IDS", "notify.admin_telegram_ids"),
    ("MANAGER_EMAILS", "notify.manager_emails"),
    ("SMTP_HOST", "notify.smtp_host"),
    ("SMTP_USER", "notify.smtp_user"),
    ("SMTP_PASSWORD", "notify.smtp_password"),
    ("BASE_URL", "notify.base_url"),
    ("BIND_ADDR", "gateway.bind_addr"),
    ("WEBHOOK_PATH", "gateway.webhook_path"),
];

/// Load configuration: compiled defaults, then `./kiosk.toml` (if present),
/// then the documented environment variables.
pub fn load_config() -> Result<KioskConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KioskConfig::default()))
        .merge(Toml::file("kiosk.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from inline TOML over compiled defaults, ignoring the
/// process environment. Used by tests and diagnostics.
pub fn load_config_from_str(toml_content: &str) -> Result<KioskConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KioskConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Environment provider restricted to the documented keys.
fn env_provider() -> Env {
    let names: Vec<&str> = ENV_KEYS.iter().map(|(name, _)| *name).collect();
    Env::raw().only(&names).map(|key| {
        let upper = key.as_str().to_ascii_uppercase();
        let mapped = ENV_KEYS
            .iter()
            .find(|(name, _)| *name == upper)
            .map(|(_, path)| (*path).to_string())
            .unwrap_or_else(|| key.as_str().to_string());
        mapped.into()
    })
}

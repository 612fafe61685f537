// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Startup validation of configuration values.
//!
//! Errors name the offending environment key so operators can fix the
//! deployment without reading source.

use kiosk_core::KioskError;

use crate::model::KioskConfig;

/// Validate ranges and cross-field constraints. Called once at startup.
pub fn validate(config: &KioskConfig) -> Result<(), KioskError> {
    let search = &config.search;

    if !(0.0..=1.0).contains(&search.min_score) {
        return Err(KioskError::Config(format!(
            "SEARCH_MIN_SCORE must be in [0, 1], got {}",
            search.min_score
        )));
    }
    if !(0.0..=0.5).contains(&search.name_boost) {
        return Err(KioskError::Config(format!(
            "SEARCH_NAME_BOOST must be in [0, 0.5], got {}",
            search.name_boost
        )));
    }
    if !(0.0..=0.5).contains(&search.article_boost) {
        return Err(KioskError::Config(format!(
            "SEARCH_ARTICLE_BOOST must be in [0, 0.5], got {}",
            search.article_boost
        )));
    }
    if search.article_boost <= search.name_boost {
        return Err(KioskError::Config(format!(
            "SEARCH_ARTICLE_BOOST ({}) must exceed SEARCH_NAME_BOOST ({})",
            search.article_boost, search.name_boost
        )));
    }
    if !(1..=20).contains(&search.max_results) {
        return Err(KioskError::Config(format!(
            "SEARCH_MAX_RESULTS must be in [1, 20], got {}",
            search.max_results
        )));
    }

    if !matches!(config.llm.default_provider.as_str(), "openai" | "yandex") {
        return Err(KioskError::Config(format!(
            "DEFAULT_LLM_PROVIDER must be \"openai\" or \"yandex\", got {:?}",
            config.llm.default_provider
        )));
    }

    let cost = &config.cost;
    if !(0.0..=1.0).contains(&cost.alert_threshold) {
        return Err(KioskError::Config(format!(
            "COST_ALERT_THRESHOLD must be in [0, 1], got {}",
            cost.alert_threshold
        )));
    }
    if cost.monthly_cost_limit_usd < 0.0 {
        return Err(KioskError::Config(format!(
            "MONTHLY_COST_LIMIT_USD must be non-negative, got {}",
            cost.monthly_cost_limit_usd
        )));
    }
    if cost.monthly_token_limit <= 0 {
        return Err(KioskError::Config(format!(
            "MONTHLY_TOKEN_LIMIT must be positive, got {}",
            cost.monthly_token_limit
        )));
    }

    if config.leads.inactivity_threshold_minutes <= 0 {
        return Err(KioskError::Config(format!(
            "LEAD_INACTIVITY_THRESHOLD must be positive, got {}",
            config.leads.inactivity_threshold_minutes
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(validate(&KioskConfig::default()).is_ok());
    }

    #[test]
    fn article_boost_must_exceed_name_boost() {
        let mut config = KioskConfig::default();
        config.search.name_boost = 0.3;
        config.search.article_boost = 0.3;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("SEARCH_ARTICLE_BOOST"));
    }

    #[test]
    fn max_results_range_enforced() {
        let mut config = KioskConfig::default();
        config.search.max_results = 0;
        assert!(validate(&config).is_err());
        config.search.max_results = 21;
        assert!(validate(&config).is_err());
        config.search.max_results = 20;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn provider_must_be_known() {
        let mut config = KioskConfig::default();
        config.llm.default_provider = "claude".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("DEFAULT_LLM_PROVIDER"));
    }

    #[test]
    fn min_score_range_enforced() {
        let mut config = KioskConfig::default();
        config.search.min_score = 1.2;
        assert!(validate(&config).is_err());
    }
}

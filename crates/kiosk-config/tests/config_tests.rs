// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for configuration loading and validation.

use kiosk_config::{load_config_from_str, validate, KioskConfig};

#[test]
fn empty_config_loads_with_defaults() {
    let config = load_config_from_str("").unwrap();
    assert_eq!(config.database.url, "kiosk.db");
    assert_eq!(config.llm.default_provider, "openai");
    assert!((config.search.min_score - 0.45).abs() < f32::EPSILON);
    assert_eq!(config.leads.inactivity_threshold_minutes, 120);
    assert!(!config.cost.auto_disable_on_limit);
    validate(&config).unwrap();
}

#[test]
fn full_config_round_trips() {
    let config = load_config_from_str(
        r#"
        [telegram]
        bot_token = "123:abc"
        disabled = false

        [database]
        url = "/var/lib/kiosk/kiosk.db"

        [llm]
        default_provider = "yandex"
        yandex_api_key = "yc-key"
        yandex_folder_id = "b1folder"

        [search]
        persist_dir = "/var/lib/kiosk/chroma"
        min_score = 0.5
        name_boost = 0.1
        article_boost = 0.25
        max_results = 15

        [cost]
        monthly_token_limit = 5000000
        monthly_cost_limit_usd = 50.0
        alert_threshold = 0.9
        auto_disable_on_limit = true

        [leads]
        inactivity_threshold_minutes = 60
        crm_endpoint = "https://crm.example.com/api"

        [notify]
        manager_telegram_chat_id = "-1001234"
        admin_telegram_ids = "1, 2, 3"
        manager_emails = "a@example.com, b@example.com"

        [gateway]
        bind_addr = "127.0.0.1:9000"
        webhook_path = "/hooks/tg"
        "#,
    )
    .unwrap();

    validate(&config).unwrap();
    assert_eq!(config.llm.default_provider, "yandex");
    assert_eq!(config.search.max_results, 15);
    assert_eq!(config.notify.admin_ids(), vec![1, 2, 3]);
    assert_eq!(config.notify.manager_email_list().len(), 2);
    assert_eq!(config.gateway.webhook_path, "/hooks/tg");
    assert!(config.cost.auto_disable_on_limit);
}

#[test]
fn validation_rejects_swapped_boosts() {
    let config = load_config_from_str(
        r#"
        [search]
        name_boost = 0.3
        article_boost = 0.2
        "#,
    )
    .unwrap();
    assert!(validate(&config).is_err());
}

#[test]
fn defaults_are_self_consistent() {
    // The compiled defaults must always pass their own validation.
    validate(&KioskConfig::default()).unwrap();
}

// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-model USD prices per 1k tokens.
//!
//! Unknown models price at zero so accounting still rolls tokens up; the
//! token limit then acts as the effective cap.

/// Blended price per 1k tokens for a provider/model pair.
pub fn price_per_1k(provider: &str, model: &str) -> f64 {
    match (provider, model) {
        ("openai", m) if m.starts_with("gpt-4o-mini") => 0.000_375,
        ("openai", m) if m.starts_with("gpt-4o") => 0.006_25,
        ("openai", m) if m.starts_with("gpt-3.5") => 0.001_0,
        ("yandex", m) if m.starts_with("yandexgpt-lite") => 0.000_2,
        ("yandex", m) if m.starts_with("yandexgpt") => 0.001_2,
        _ => 0.0,
    }
}

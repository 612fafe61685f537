// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Intent classification: a deterministic keyword pre-pass, then the LLM.
//!
//! The pre-pass uses per-label anchor terms; it answers only when exactly
//! one label matches, so its verdicts are unambiguous and repeatable. The
//! LLM handles everything else, and any failure or timeout degrades to
//! `General`.

use std::sync::Arc;
use std::time::Duration;

use kiosk_core::Intent;
use kiosk_llm::{LlmGateway, PromptRegistry};
use tracing::{debug, warn};

/// Labels offered to the LLM classifier.
pub const INTENT_LABELS: [&str; 5] = ["PRODUCT", "SERVICE", "COMPANY_INFO", "CONTACT", "GENERAL"];

/// Ceiling on the LLM classification leg.
const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Anchor terms per label. Matching is lowercase substring, Russian and
/// English both, mirroring the traffic the bot actually sees.
const CONTACT_TERMS: &[&str] = &[
    "менеджер", "manager", "свяжитесь", "связаться", "contact", "позвонить", "перезвоните",
    "call me", "заказать", "order", "купить", "buy", "цена", "price", "стоимость", "cost",
    "консультация", "consultation", "оператор", "operator",
];

const PRODUCT_TERMS: &[&str] = &[
    "товар", "product", "оборудование", "equipment", "запчасть", "spare part", "деталь",
    "артикул", "article", "sku", "модель", "model", "найти", "find", "искать", "search",
    "нужен", "нужна", "нужно", "need", "требуется", "болт", "гайка", "шайба", "подшипник",
    "bearing", "фильтр", "filter", "ремень", "belt", "сверло", "drill", "насос", "pump",
    "есть ли у вас", "продаете ли", "в наличии", "in stock", "do you have",
];

const COMPANY_TERMS: &[&str] = &[
    "компания", "company", "о вас", "about you", "кто вы", "who are you", "адрес", "address",
    "где находится", "where located", "контакты компании", "история", "history",
    "когда основана", "when founded", "чем занимаетесь", "what do you do",
];

const SERVICE_TERMS: &[&str] = &[
    "услуга", "услуги", "service", "services", "доставка", "delivery", "гарантия", "warranty",
    "поддержка", "support", "сервис", "монтаж", "installation", "обслуживание", "maintenance",
];

fn label_terms() -> [(Intent, &'static [&'static str]); 4] {
    [
        (Intent::Contact, CONTACT_TERMS),
        (Intent::Product, PRODUCT_TERMS),
        (Intent::CompanyInfo, COMPANY_TERMS),
        (Intent::Service, SERVICE_TERMS),
    ]
}

/// Keyword pre-pass: `Some(intent)` only when exactly one label matches.
/// Deterministic for any given input.
pub fn keyword_prepass(text: &str) -> Option<Intent> {
    let lower = text.to_lowercase();
    let mut matched = None;
    for (intent, terms) in label_terms() {
        if terms.iter().any(|term| lower.contains(term)) {
            match matched {
                None => matched = Some(intent),
                Some(_) => return None, // ambiguous, defer to the LLM
            }
        }
    }
    matched
}

pub struct QueryClassifier {
    gateway: Arc<LlmGateway>,
    prompts: Arc<PromptRegistry>,
}

impl QueryClassifier {
    pub fn new(gateway: Arc<LlmGateway>, prompts: Arc<PromptRegistry>) -> Self {
        Self { gateway, prompts }
    }

    /// Map an utterance to an intent. Never fails: LLM unavailability, an
    /// unknown label, or a timeout all degrade to `General`.
    pub async fn classify(&self, text: &str) -> Intent {
        if let Some(intent) = keyword_prepass(text) {
            debug!(intent = %intent, "intent resolved by keyword pre-pass");
            return intent;
        }

        let template = match self.prompts.get("classification").await {
            Ok(template) => template,
            Err(e) => {
                warn!(error = %e, "classification prompt unavailable");
                return Intent::General;
            }
        };

        let llm_leg = self.gateway.classify(text, &INTENT_LABELS, &template);
        match tokio::time::timeout(CLASSIFY_TIMEOUT, llm_leg).await {
            Ok(Ok(label)) => label.parse().unwrap_or(Intent::General),
            Ok(Err(e)) => {
                warn!(error = %e, "llm classification failed, falling back to GENERAL");
                Intent::General
            }
            Err(_) => {
                warn!("llm classification timed out, falling back to GENERAL");
                Intent::General
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_phrases_resolve_without_llm() {
        assert_eq!(keyword_prepass("нужен ноутбук для работы"), Some(Intent::Product));
        assert_eq!(keyword_prepass("do you have bearings in stock"), Some(Intent::Product));
    }

    #[test]
    fn contact_phrases_resolve_without_llm() {
        assert_eq!(
            keyword_prepass("свяжитесь со мной, +79001234567, Иванов"),
            Some(Intent::Contact)
        );
    }

    #[test]
    fn company_phrases_resolve_without_llm() {
        assert_eq!(keyword_prepass("чем занимаетесь?"), Some(Intent::CompanyInfo));
    }

    #[test]
    fn service_phrases_resolve_without_llm() {
        assert_eq!(keyword_prepass("какая гарантия?"), Some(Intent::Service));
    }

    #[test]
    fn ambiguous_input_defers_to_llm() {
        // Both a product term and a contact term: the pre-pass must pass.
        assert_eq!(keyword_prepass("какая цена на подшипник 6205"), None);
    }

    #[test]
    fn neutral_input_defers_to_llm() {
        assert_eq!(keyword_prepass("привет"), None);
        assert_eq!(keyword_prepass("спасибо, понял"), None);
    }

    #[test]
    fn prepass_is_deterministic() {
        for _ in 0..100 {
            assert_eq!(
                keyword_prepass("нужен насос для дачи"),
                Some(Intent::Product)
            );
        }
    }
}

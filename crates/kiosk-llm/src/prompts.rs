// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Versioned, hot-reloadable named prompts.
//!
//! `get` serves an in-process cache; the only I/O happens on the first
//! access of a name and on explicit `reload`. Compiled-in defaults seed the
//! registry on empty storage. Every default enforces replying in the
//! user's own language.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use kiosk_core::{KioskError, Prompt, Role};
use kiosk_storage::{queries, Database};
use tracing::debug;

/// Compiled-in prompt defaults, used when storage has no active version.
const DEFAULT_PROMPTS: &[(&str, &str)] = &[
    (
        "system_prompt",
        "You are the AI consultant of an equipment and spare-parts supplier.\n\
         Always reply in the same language the user writes in.\n\
         Help the customer find products in the catalog, explain the company's \
         services, and answer general questions. Be friendly and professional. \
         When you cannot help, offer to connect the customer with a manager.",
    ),
    (
        "classification",
        "Classify the user request into exactly one of these categories:\n\
         {labels}\n\n\
         PRODUCT - looking for a specific product, equipment or spare part, \
         including availability questions.\n\
         SERVICE - question about the company's services (support, delivery terms, warranty).\n\
         COMPANY_INFO - question about the company itself (name, location, contacts, history).\n\
         CONTACT - the user wants to reach a manager or leave contact details.\n\
         GENERAL - anything else, greetings included.\n\n\
         If a concrete product name or article is mentioned, the answer is always PRODUCT.\n\
         Answer with the single category word only.\n\n\
         Request: {query}\n\nCategory:",
    ),
    (
        "product_search",
        "Present the catalog search results to the customer.\n\
         Reply in the user's language. Show the most relevant products (five at most); \
         for each give the name, article and a short description. Offer further help, \
         and suggest contacting a manager for ordering.\n\n\
         Search results: {search_results}\n\
         User request: {user_query}",
    ),
    (
        "service_answer",
        "Answer the customer's question about the company's services using only \
         the information below. Reply in the user's language. If the information \
         is not sufficient, suggest contacting a manager.\n\n\
         Services: {services_info}\n\
         User request: {user_query}",
    ),
    (
        "company_info",
        "Answer the customer's question about the company using the information \
         below. Reply in the user's language.\n\n\
         Company information: {company_info}\n\
         User request: {user_query}",
    ),
    (
        "general_conversation",
        "Reply to the customer as the company's consultant. Reply in the user's \
         language. You can help with finding products, explaining services, and \
         connecting the customer with a manager.\n\n\
         User request: {user_query}",
    ),
    (
        "lead_qualification",
        "The customer wants to be contacted by a manager. Reply in the user's \
         language. Thank them, and ask for whatever contact details are still \
         missing: a last name plus a phone number or an email address. Keep it \
         to one short message.\n\n\
         User request: {user_query}",
    ),
    (
        "search_query_extraction",
        "Extract the product search keywords from the user request. Remove \
         availability phrasing, question words and politeness; keep product \
         names, articles, models and technical attributes in their original \
         language and order. Answer with the keywords only.\n\n\
         Request: {user_query}\n\nKeywords:",
    ),
];

fn default_content(name: &str) -> Option<&'static str> {
    DEFAULT_PROMPTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, content)| *content)
}

/// In-process prompt cache over the versioned prompt table.
pub struct PromptRegistry {
    db: Database,
    cache: RwLock<HashMap<String, String>>,
}

impl PromptRegistry {
    pub fn new(db: Database) -> Arc<Self> {
        Arc::new(Self {
            db,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Ensure every compiled-in default has an active version, then warm
    /// the cache. Called once at startup.
    pub async fn seed_defaults(&self) -> Result<(), KioskError> {
        for (name, content) in DEFAULT_PROMPTS {
            if queries::prompts::get_active(&self.db, name).await?.is_none() {
                queries::prompts::put(&self.db, name, content, Role::System).await?;
                debug!(name, "seeded default prompt");
            }
        }
        self.reload().await
    }

    /// Fetch a prompt by name. Cache hits never touch storage; the first
    /// access of a name loads it (seeding the compiled-in default when the
    /// table has none). Unknown names fail with `PromptNotFound`.
    pub async fn get(&self, name: &str) -> Result<String, KioskError> {
        if let Some(content) = self.read_cache(name) {
            return Ok(content);
        }

        if let Some(prompt) = queries::prompts::get_active(&self.db, name).await? {
            self.write_cache(name, &prompt.content);
            return Ok(prompt.content);
        }

        match default_content(name) {
            Some(content) => {
                queries::prompts::put(&self.db, name, content, Role::System).await?;
                self.write_cache(name, content);
                Ok(content.to_string())
            }
            None => Err(KioskError::PromptNotFound(name.to_string())),
        }
    }

    /// Store a new version of `name`, activate it, and refresh the cache.
    pub async fn put(&self, name: &str, content: &str) -> Result<Prompt, KioskError> {
        let prompt = queries::prompts::put(&self.db, name, content, Role::System).await?;
        self.write_cache(name, content);
        Ok(prompt)
    }

    /// Replace the whole cache from the active rows in storage.
    pub async fn reload(&self) -> Result<(), KioskError> {
        let prompts = queries::prompts::list_active(&self.db).await?;
        let fresh: HashMap<String, String> = prompts
            .into_iter()
            .map(|p| (p.name, p.content))
            .collect();
        match self.cache.write() {
            Ok(mut cache) => *cache = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
        Ok(())
    }

    fn read_cache(&self, name: &str) -> Option<String> {
        match self.cache.read() {
            Ok(cache) => cache.get(name).cloned(),
            Err(poisoned) => poisoned.into_inner().get(name).cloned(),
        }
    }

    fn write_cache(&self, name: &str, content: &str) {
        let entry = (name.to_string(), content.to_string());
        match self.cache.write() {
            Ok(mut cache) => {
                cache.insert(entry.0, entry.1);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(entry.0, entry.1);
            }
        }
    }
}

/// Fill `{placeholders}` in a prompt template.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (key, value) in values {
        rendered = rendered.replace(&format!("{{{key}}}"), value);
    }
    rendered
}

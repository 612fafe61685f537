// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service and company-info lookup. Pure keyword matching, no LLM calls,
//! nothing vectorized.

use kiosk_core::{CompanyService, KioskError};
use kiosk_storage::{queries, Database};

pub struct KnowledgeStore {
    db: Database,
}

impl KnowledgeStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Active services matching the query by keyword, title, or category.
    /// When nothing matches, every active service is returned so the reply
    /// can still present the catalog of services.
    pub async fn find_services(&self, query: &str) -> Result<Vec<CompanyService>, KioskError> {
        let services = queries::services::list_active_services(&self.db).await?;
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(services);
        }

        let matched: Vec<CompanyService> = services
            .iter()
            .filter(|service| service_matches(service, &needle))
            .cloned()
            .collect();
        if matched.is_empty() {
            Ok(services)
        } else {
            Ok(matched)
        }
    }

    /// The uploaded company-info blob, if present.
    pub async fn company_info(&self) -> Result<Option<String>, KioskError> {
        queries::services::active_company_info(&self.db).await
    }
}

fn service_matches(service: &CompanyService, needle: &str) -> bool {
    if service.title.to_lowercase().contains(needle) {
        return true;
    }
    if let Some(category) = &service.category {
        if category.to_lowercase().contains(needle) {
            return true;
        }
    }
    service
        .keywords
        .iter()
        .any(|keyword| needle.contains(&keyword.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> KnowledgeStore {
        let db = Database::open_in_memory().await.unwrap();
        for (id, title, keywords) in [
            ("s1", "Доставка по России", vec!["доставка", "delivery"]),
            ("s2", "Гарантийный сервис", vec!["гарантия", "warranty"]),
        ] {
            queries::services::upsert_service(
                &db,
                &CompanyService {
                    id: id.to_string(),
                    title: title.to_string(),
                    description: format!("{title} - описание"),
                    category: Some("support".to_string()),
                    keywords: keywords.into_iter().map(String::from).collect(),
                    active: true,
                },
            )
            .await
            .unwrap();
        }
        KnowledgeStore::new(db)
    }

    #[tokio::test]
    async fn keyword_match_narrows_results() {
        let store = seeded().await;
        let services = store
            .find_services("какая у вас гарантия на оборудование")
            .await
            .unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].id, "s2");
    }

    #[tokio::test]
    async fn no_match_returns_all_active() {
        let store = seeded().await;
        let services = store.find_services("цены на болты").await.unwrap();
        assert_eq!(services.len(), 2);
    }

    #[tokio::test]
    async fn company_info_absent_is_none() {
        let store = seeded().await;
        assert!(store.company_info().await.unwrap().is_none());
    }
}

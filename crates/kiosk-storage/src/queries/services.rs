// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Company services and the company-info blob.

use kiosk_core::{CompanyService, KioskError};
use rusqlite::params;

use crate::database::{map_tr_err, now_iso, Database};

fn row_to_service(row: &rusqlite::Row) -> rusqlite::Result<CompanyService> {
    let keywords_json: String = row.get(4)?;
    Ok(CompanyService {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
        active: row.get(5)?,
    })
}

const SERVICE_COLUMNS: &str = "id, title, description, category, keywords, active";

/// Insert or replace a company service.
pub async fn upsert_service(db: &Database, service: &CompanyService) -> Result<(), KioskError> {
    let service = service.clone();
    let keywords_json = serde_json::to_string(&service.keywords)
        .map_err(|e| KioskError::Internal(format!("keywords serialization failed: {e}")))?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO company_services ({SERVICE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    service.id,
                    service.title,
                    service.description,
                    service.category,
                    keywords_json,
                    service.active,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All active services.
pub async fn list_active_services(db: &Database) -> Result<Vec<CompanyService>, KioskError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SERVICE_COLUMNS} FROM company_services WHERE active = 1 ORDER BY title"
            ))?;
            let services = stmt
                .query_map([], row_to_service)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(services)
        })
        .await
        .map_err(map_tr_err)
}

/// The latest active company-info blob, if one was uploaded.
pub async fn active_company_info(db: &Database) -> Result<Option<String>, KioskError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT content FROM company_info WHERE active = 1
                 ORDER BY created_at DESC LIMIT 1",
            )?;
            let mut rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            Ok(rows.next().transpose()?)
        })
        .await
        .map_err(map_tr_err)
}

/// Store a new company-info blob, deactivating previous ones.
pub async fn set_company_info(
    db: &Database,
    content: &str,
    original_filename: Option<&str>,
) -> Result<(), KioskError> {
    let content = content.to_string();
    let original_filename = original_filename.map(String::from);
    let created_at = now_iso();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("UPDATE company_info SET active = 0 WHERE active = 1", [])?;
            tx.execute(
                "INSERT INTO company_info (content, original_filename, active, created_at)
                 VALUES (?1, ?2, 1, ?3)",
                params![content, original_filename, created_at],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_service(id: &str, title: &str, keywords: &[&str]) -> CompanyService {
        CompanyService {
            id: id.to_string(),
            title: title.to_string(),
            description: format!("{title} description"),
            category: Some("support".to_string()),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            active: true,
        }
    }

    #[tokio::test]
    async fn services_round_trip_with_keywords() {
        let db = Database::open_in_memory().await.unwrap();
        upsert_service(&db, &sample_service("s1", "Доставка", &["доставка", "delivery"]))
            .await
            .unwrap();

        let services = list_active_services(&db).await.unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].keywords, vec!["доставка", "delivery"]);
    }

    #[tokio::test]
    async fn inactive_services_are_hidden() {
        let db = Database::open_in_memory().await.unwrap();
        let mut service = sample_service("s1", "Гарантия", &["гарантия"]);
        service.active = false;
        upsert_service(&db, &service).await.unwrap();

        assert!(list_active_services(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn company_info_latest_active_wins() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(active_company_info(&db).await.unwrap().is_none());

        set_company_info(&db, "Первая версия", Some("about_v1.docx"))
            .await
            .unwrap();
        set_company_info(&db, "Вторая версия", Some("about_v2.docx"))
            .await
            .unwrap();

        let info = active_company_info(&db).await.unwrap().unwrap();
        assert_eq!(info, "Вторая версия");
    }
}

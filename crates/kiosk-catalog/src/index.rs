// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An immutable catalog index snapshot: products with their embeddings.
//!
//! One index is built per CatalogVersion and persisted as a standalone
//! SQLite file under `<persist_dir>/<version_name>/index.db`, with
//! embeddings stored as little-endian f32 BLOBs. Readers always hold an
//! `Arc<CatalogIndex>`, so a swap can never expose a half-built index.

use std::path::Path;

use kiosk_core::{KioskError, Product};
use rusqlite::params;

use crate::embedder::cosine_score;

/// One indexed catalog row.
#[derive(Debug)]
pub struct IndexEntry {
    pub product: Product,
    pub embedding: Vec<f32>,
}

/// Immutable in-memory index for one catalog version.
#[derive(Debug)]
pub struct CatalogIndex {
    version_name: String,
    entries: Vec<IndexEntry>,
}

impl CatalogIndex {
    pub fn new(version_name: String, entries: Vec<IndexEntry>) -> Self {
        Self {
            version_name,
            entries,
        }
    }

    pub fn version_name(&self) -> &str {
        &self.version_name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw cosine search: top `k_raw` products by similarity, descending.
    pub fn raw_search(&self, query_embedding: &[f32], k_raw: usize) -> Vec<(Product, f32)> {
        let mut scored: Vec<(Product, f32)> = self
            .entries
            .iter()
            .map(|entry| {
                (
                    entry.product.clone(),
                    cosine_score(query_embedding, &entry.embedding),
                )
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        scored.truncate(k_raw);
        scored
    }

    /// Persist the index into `dir/index.db`, replacing any previous file.
    pub fn save(&self, dir: &Path) -> Result<(), KioskError> {
        std::fs::create_dir_all(dir).map_err(storage_err)?;
        let path = dir.join("index.db");
        let mut conn = rusqlite::Connection::open(&path).map_err(storage_err)?;
        let tx = conn.transaction().map_err(storage_err)?;
        tx.execute_batch(
            "DROP TABLE IF EXISTS products;
             CREATE TABLE products (
                 id TEXT PRIMARY KEY NOT NULL,
                 product_name TEXT NOT NULL,
                 category_1 TEXT NOT NULL,
                 article TEXT NOT NULL,
                 description TEXT,
                 category_2 TEXT,
                 category_3 TEXT,
                 photo_url TEXT,
                 page_url TEXT,
                 embedding BLOB NOT NULL
             );",
        )
        .map_err(storage_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO products (id, product_name, category_1, article, description,
                     category_2, category_3, photo_url, page_url, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )
                .map_err(storage_err)?;
            for entry in &self.entries {
                let p = &entry.product;
                stmt.execute(params![
                    p.id,
                    p.product_name,
                    p.category_1,
                    p.article,
                    p.description,
                    p.category_2,
                    p.category_3,
                    p.photo_url,
                    p.page_url,
                    vec_to_blob(&entry.embedding),
                ])
                .map_err(storage_err)?;
            }
        }
        tx.commit().map_err(storage_err)
    }

    /// Load a previously saved index from `dir/index.db`.
    pub fn load(version_name: String, dir: &Path) -> Result<Self, KioskError> {
        let path = dir.join("index.db");
        let conn = rusqlite::Connection::open_with_flags(
            &path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )
        .map_err(|e| {
            KioskError::NotFound(format!("index file {} unreadable: {e}", path.display()))
        })?;
        let mut stmt = conn
            .prepare(
                "SELECT id, product_name, category_1, article, description,
                 category_2, category_3, photo_url, page_url, embedding FROM products",
            )
            .map_err(storage_err)?;
        let entries = stmt
            .query_map([], |row| {
                let blob: Vec<u8> = row.get(9)?;
                Ok(IndexEntry {
                    product: Product {
                        id: row.get(0)?,
                        product_name: row.get(1)?,
                        category_1: row.get(2)?,
                        article: row.get(3)?,
                        description: row.get(4)?,
                        category_2: row.get(5)?,
                        category_3: row.get(6)?,
                        photo_url: row.get(7)?,
                        page_url: row.get(8)?,
                    },
                    embedding: blob_to_vec(&blob),
                })
            })
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(Self::new(version_name, entries))
    }
}

fn storage_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> KioskError {
    KioskError::Storage {
        source: Box::new(e),
    }
}

/// f32 slice to little-endian bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Little-endian bytes back to f32s.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, name: &str, article: &str) -> Product {
        Product {
            id: id.to_string(),
            product_name: name.to_string(),
            category_1: "Электроника".to_string(),
            article: article.to_string(),
            description: None,
            category_2: None,
            category_3: None,
            photo_url: None,
            page_url: None,
        }
    }

    fn index() -> CatalogIndex {
        CatalogIndex::new(
            "v1".to_string(),
            vec![
                IndexEntry {
                    product: product("P-001", "Ноутбук бизнес-класса", "DL001"),
                    embedding: vec![1.0, 0.0, 0.0],
                },
                IndexEntry {
                    product: product("P-002", "Мышь беспроводная", "MS002"),
                    embedding: vec![0.0, 1.0, 0.0],
                },
                IndexEntry {
                    product: product("P-003", "Клавиатура", "KB003"),
                    embedding: vec![0.6, 0.8, 0.0],
                },
            ],
        )
    }

    #[test]
    fn raw_search_ranks_by_cosine() {
        let results = index().raw_search(&[1.0, 0.0, 0.0], 10);
        assert_eq!(results[0].0.id, "P-001");
        assert!((results[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(results[1].0.id, "P-003");
        assert!((results[1].1 - 0.6).abs() < 1e-6);
    }

    #[test]
    fn raw_search_truncates_to_k() {
        let results = index().raw_search(&[1.0, 0.0, 0.0], 2);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn blob_round_trip() {
        let original: Vec<f32> = (0..384).map(|i| i as f32 / 384.0).collect();
        let restored = blob_to_vec(&vec_to_blob(&original));
        assert_eq!(original, restored);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let original = index();
        original.save(dir.path()).unwrap();

        let loaded = CatalogIndex::load("v1".to_string(), dir.path()).unwrap();
        assert_eq!(loaded.len(), 3);
        let results = loaded.raw_search(&[0.0, 1.0, 0.0], 1);
        assert_eq!(results[0].0.id, "P-002");
    }

    #[test]
    fn load_missing_dir_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = CatalogIndex::load("v9".to_string(), &dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, KioskError::NotFound(_)));
    }
}

// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The catalog engine: blue-green rebuilds and boosted search.
//!
//! The active index lives behind a read-mostly lock holding an
//! `Arc<CatalogIndex>`. A rebuild works on a fresh directory and a fresh
//! index value; activation is one Arc swap plus one database transaction,
//! so every query observes either the old or the new index, never a mix.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use kiosk_config::model::SearchConfig;
use kiosk_core::{CatalogVersion, KioskError, Product, ScoredProduct};
use kiosk_storage::{queries, Database};
use tracing::{info, warn};

use crate::embedder::LazyEmbedder;
use crate::index::{CatalogIndex, IndexEntry};
use crate::loader;

/// Rows embedded per progress update during a build.
const BUILD_BATCH: usize = 100;

pub struct CatalogEngine {
    db: Database,
    config: SearchConfig,
    embedder: LazyEmbedder,
    active: RwLock<Option<Arc<CatalogIndex>>>,
}

impl CatalogEngine {
    /// Construct the engine and try to restore the active index from disk.
    /// A missing or unreadable index leaves the engine serving empty
    /// results; it never fails startup.
    pub async fn new(db: Database, config: SearchConfig) -> Arc<Self> {
        let embedder = LazyEmbedder::new(Path::new(&config.persist_dir), &config.embedding_model);
        let engine = Arc::new(Self {
            db,
            config,
            embedder,
            active: RwLock::new(None),
        });

        match queries::catalog::active_version(&engine.db).await {
            Ok(Some(version)) => {
                let dir = engine.version_dir(&version.version_name);
                let name = version.version_name.clone();
                let loaded =
                    tokio::task::spawn_blocking(move || CatalogIndex::load(name, &dir)).await;
                match loaded {
                    Ok(Ok(index)) => {
                        info!(
                            version = version.version_name.as_str(),
                            products = index.len(),
                            "catalog index restored"
                        );
                        engine.install(Arc::new(index));
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "active catalog index unreadable, serving empty results")
                    }
                    Err(e) => warn!(error = %e, "catalog index load task failed"),
                }
            }
            Ok(None) => info!("no active catalog version, serving empty results"),
            Err(e) => warn!(error = %e, "could not read catalog versions"),
        }
        engine
    }

    fn version_dir(&self, version_name: &str) -> PathBuf {
        Path::new(&self.config.persist_dir).join(version_name)
    }

    fn install(&self, index: Arc<CatalogIndex>) {
        match self.active.write() {
            Ok(mut active) => *active = Some(index),
            Err(poisoned) => *poisoned.into_inner() = Some(index),
        }
    }

    fn active_index(&self) -> Option<Arc<CatalogIndex>> {
        match self.active.read() {
            Ok(active) => active.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Name of the version currently serving queries.
    pub fn active_version_name(&self) -> Option<String> {
        self.active_index().map(|i| i.version_name().to_string())
    }

    /// True once an index is installed.
    pub fn is_ready(&self) -> bool {
        self.active_index().is_some()
    }

    /// Blue-green rebuild from an uploaded catalog file. The current index
    /// keeps serving until the new version activates.
    pub async fn rebuild_from_file(&self, path: &Path) -> Result<CatalogVersion, KioskError> {
        let products = loader::load_products(path)?;
        if products.is_empty() {
            return Err(KioskError::Validation(
                "no indexable rows in catalog file".into(),
            ));
        }

        let version_name = format!(
            "v{}-{}",
            chrono::Utc::now().format("%Y%m%d%H%M%S"),
            &uuid_suffix()
        );
        let total = products.len() as i64;
        let version = queries::catalog::create_version(&self.db, &version_name, total).await?;
        info!(version = version_name.as_str(), rows = total, "catalog build started");

        match self.build_index(&version_name, products).await {
            Ok(index) => {
                let displaced =
                    queries::catalog::activate_version(&self.db, &version_name).await?;
                self.install(Arc::new(index));
                info!(
                    version = version_name.as_str(),
                    displaced = displaced.as_deref().unwrap_or("-"),
                    "catalog version activated"
                );
                Ok(queries::catalog::get_version(&self.db, &version_name)
                    .await?
                    .unwrap_or(version))
            }
            Err(e) => {
                warn!(version = version_name.as_str(), error = %e, "catalog build failed");
                queries::catalog::mark_failed(&self.db, &version_name).await?;
                let _ = std::fs::remove_dir_all(self.version_dir(&version_name));
                Err(e)
            }
        }
    }

    async fn build_index(
        &self,
        version_name: &str,
        products: Vec<Product>,
    ) -> Result<CatalogIndex, KioskError> {
        let embedder = self.embedder.get().await?;
        let mut entries = Vec::with_capacity(products.len());
        let mut indexed = 0i64;

        for batch in products.chunks(BUILD_BATCH) {
            let batch = batch.to_vec();
            let embedder = embedder.clone();
            let embedded: Vec<IndexEntry> = tokio::task::spawn_blocking(move || {
                batch
                    .into_iter()
                    .map(|product| {
                        let embedding = embedder.embed_text(&product.search_text())?;
                        Ok(IndexEntry { product, embedding })
                    })
                    .collect::<Result<Vec<_>, KioskError>>()
            })
            .await
            .map_err(|e| KioskError::Internal(format!("embedding task failed: {e}")))??;

            indexed += embedded.len() as i64;
            entries.extend(embedded);
            queries::catalog::update_progress(&self.db, version_name, indexed).await?;
        }

        let index = CatalogIndex::new(version_name.to_string(), entries);
        let dir = self.version_dir(version_name);
        let save_dir = dir.clone();
        // Persist before activation so a restart can restore this version.
        let index = tokio::task::spawn_blocking(move || {
            index.save(&save_dir)?;
            Ok::<_, KioskError>(index)
        })
        .await
        .map_err(|e| KioskError::Internal(format!("index save task failed: {e}")))??;
        Ok(index)
    }

    /// Boosted catalog search.
    ///
    /// A missing or unbuilt index yields an empty result set, not an error;
    /// the orchestrator can still answer from the LLM alone. A failed
    /// embedding model load surfaces `ModelUnavailable`.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredProduct>, KioskError> {
        if query.trim().is_empty() {
            return Ok(vec![]);
        }
        if self.active_index().is_none() {
            warn!("catalog search requested but no index is active");
            return Ok(vec![]);
        }

        let embedder = self.embedder.get().await?;
        let text = query.to_string();
        let query_embedding =
            tokio::task::spawn_blocking(move || embedder.embed_text(&text))
                .await
                .map_err(|e| KioskError::Internal(format!("query embedding task failed: {e}")))??;

        Ok(self.search_with_embedding(query, &query_embedding, k))
    }

    /// Search against the current index snapshot with a pre-computed query
    /// embedding. The snapshot is captured once, so a concurrent swap
    /// cannot mix versions within one call.
    pub fn search_with_embedding(
        &self,
        query: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Vec<ScoredProduct> {
        let Some(index) = self.active_index() else {
            return vec![];
        };
        let k_raw = k.max(self.config.max_results);
        let candidates = index.raw_search(query_embedding, k_raw);
        rank_candidates(query, candidates, &self.config)
    }

    /// Remove superseded version directories past the grace period.
    pub async fn gc_superseded(&self, grace: chrono::Duration) -> Result<usize, KioskError> {
        let cutoff = (chrono::Utc::now() - grace)
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        let eligible = queries::catalog::superseded_before(&self.db, &cutoff).await?;
        let mut removed = 0;
        for version in eligible {
            let dir = self.version_dir(&version.version_name);
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(version = version.version_name.as_str(), error = %e, "index dir removal failed");
                    continue;
                }
            }
            queries::catalog::delete_version(&self.db, &version.version_name).await?;
            removed += 1;
        }
        if removed > 0 {
            info!(removed, "superseded catalog versions collected");
        }
        Ok(removed)
    }
}

fn uuid_suffix() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// Apply boosts, the score floor, the deterministic sort, and the result
/// cap to raw candidates.
///
/// Boosts: `+name_boost` when the lowercased query is a substring of the
/// product name, `+article_boost` when it is a substring of the article.
/// Ordering: post-boost score desc, then raw score desc, then id asc.
pub fn rank_candidates(
    query: &str,
    candidates: Vec<(Product, f32)>,
    config: &SearchConfig,
) -> Vec<ScoredProduct> {
    let needle = query.trim().to_lowercase();
    let mut ranked: Vec<ScoredProduct> = candidates
        .into_iter()
        .map(|(product, raw_score)| {
            let mut boost = 0.0;
            if !needle.is_empty() {
                if product.product_name.to_lowercase().contains(&needle) {
                    boost += config.name_boost;
                }
                if product.article.to_lowercase().contains(&needle) {
                    boost += config.article_boost;
                }
            }
            ScoredProduct {
                score: raw_score + boost,
                raw_score,
                product,
            }
        })
        .filter(|scored| scored.score >= config.min_score)
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.raw_score
                    .partial_cmp(&a.raw_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.product.id.cmp(&b.product.id))
    });
    ranked.truncate(config.max_results);
    ranked
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

    fn config() -> SearchConfig {
        SearchConfig::default()
    }

    #[test]
    fn scores_below_floor_are_dropped() {
        let ranked = rank_candidates(
            "насос",
            vec![
                (product("P-1", "Насос центробежный", "NC-1"), 0.30),
                (product("P-2", "Шланг", "SH-2"), 0.44),
            ],
            &config(),
        );
        // P-1: 0.30 + 0.20 name boost = 0.50 >= 0.45. P-2: 0.44 < 0.45.
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].product.id, "P-1");
        assert!((ranked[0].score - 0.50).abs() < 1e-6);
    }

    #[test]
    fn article_match_outranks_name_match_all_else_equal() {
        let ranked = rank_candidates(
            "dl001",
            vec![
                (product("P-name", "Кабель DL001 совместимый", "KB-7"), 0.50),
                (product("P-article", "Ноутбук бизнес-класса", "DL001"), 0.50),
            ],
            &config(),
        );
        assert_eq!(ranked[0].product.id, "P-article");
        assert!((ranked[0].score - 0.80).abs() < 1e-6);
        assert_eq!(ranked[1].product.id, "P-name");
        assert!((ranked[1].score - 0.70).abs() < 1e-6);
    }

    #[test]
    fn matching_name_and_article_stacks_both_boosts() {
        let ranked = rank_candidates(
            "dl001",
            vec![(product("P-1", "Док-станция DL001", "DL001-X"), 0.50)],
            &config(),
        );
        assert!((ranked[0].score - 1.00).abs() < 1e-6);
    }

    #[test]
    fn ties_break_by_raw_score_then_id() {
        let mut cfg = config();
        cfg.min_score = 0.0;
        let ranked = rank_candidates(
            "зажим",
            vec![
                (product("P-b", "Зажим винтовой", "Z-2"), 0.50),
                (product("P-a", "Зажим винтовой", "Z-1"), 0.50),
                (product("P-c", "Зажим пружинный обычный", "Z-3"), 0.48),
            ],
            &cfg,
        );
        // Same boosted score for P-a and P-b; id ascending decides.
        assert_eq!(ranked[0].product.id, "P-a");
        assert_eq!(ranked[1].product.id, "P-b");
        assert_eq!(ranked[2].product.id, "P-c");
    }

    #[test]
    fn results_capped_at_max() {
        let mut cfg = config();
        cfg.min_score = 0.0;
        cfg.max_results = 2;
        let candidates = (0..5)
            .map(|i| (product(&format!("P-{i}"), "Болт", "B-1"), 0.9 - i as f32 * 0.1))
            .collect();
        let ranked = rank_candidates("гайка", candidates, &cfg);
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn ranking_is_deterministic() {
        let make = || {
            rank_candidates(
                "болт",
                vec![
                    (product("P-2", "Болт М10", "B-10"), 0.6),
                    (product("P-1", "Болт М8", "B-8"), 0.6),
                    (product("P-3", "Гайка М8", "N-8"), 0.7),
                ],
                &config(),
            )
        };
        let ids = |v: Vec<ScoredProduct>| {
            v.into_iter().map(|s| s.product.id).collect::<Vec<_>>()
        };
        assert_eq!(ids(make()), ids(make()));
    }

    #[tokio::test]
    async fn search_without_index_is_empty_not_an_error() {
        let db = Database::open_in_memory().await.unwrap();
        let engine = CatalogEngine::new(db, config()).await;
        assert!(!engine.is_ready());
        let results = engine.search_with_embedding("ноутбук", &[1.0, 0.0], 10);
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn swap_is_atomic_for_readers() {
        let db = Database::open_in_memory().await.unwrap();
        let engine = CatalogEngine::new(db, config()).await;

        let v1 = CatalogIndex::new(
            "v1".to_string(),
            vec![crate::index::IndexEntry {
                product: product("P-001", "Ноутбук бизнес-класса", "DL001"),
                embedding: vec![1.0, 0.0],
            }],
        );
        engine.install(Arc::new(v1));
        assert_eq!(engine.active_version_name().as_deref(), Some("v1"));

        let before = engine.search_with_embedding("ноутбук", &[1.0, 0.0], 10);
        assert_eq!(before[0].product.id, "P-001");

        let v2 = CatalogIndex::new(
            "v2".to_string(),
            vec![crate::index::IndexEntry {
                product: product("P-100", "Ноутбук игровой", "GL100"),
                embedding: vec![1.0, 0.0],
            }],
        );
        engine.install(Arc::new(v2));

        let after = engine.search_with_embedding("ноутбук", &[1.0, 0.0], 10);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].product.id, "P-100", "post-swap queries see v2 only");
    }
}

//! Persistent name normalization cache
//!
//! Maps an original name (lower-cased, trimmed) to its canonical name and
//! confidence, scoped per [`NormalizationDomain`]. No TTL or invalidation:
//! a later write for the same key replaces the earlier one.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tokio::sync::RwLock;
use xrf_common::events::NormalizationDomain;

use crate::models::{name_key, NormalizationRecord};

/// SQLite bound-parameter headroom per lookup query
const LOOKUP_CHUNK_SIZE: usize = 500;

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache lookup failed: {0}")]
    Lookup(#[source] sqlx::Error),

    /// Some records were not written; the others were
    #[error("Cache persist failed for {failed} of {total} records: {source}")]
    Persist {
        failed: usize,
        total: usize,
        #[source]
        source: sqlx::Error,
    },

    #[error("Cache query failed: {0}")]
    Query(#[source] sqlx::Error),
}

/// A stored mapping
#[derive(Debug, Clone, PartialEq)]
pub struct CachedName {
    pub canonical_name: String,
    pub confidence: f32,
}

/// Durable key/value store of prior name mappings
#[async_trait]
pub trait NormalizationCache: Send + Sync {
    /// Return the subset of `names` that has a stored mapping, keyed by name
    async fn lookup(
        &self,
        domain: NormalizationDomain,
        names: &BTreeSet<String>,
    ) -> Result<HashMap<String, CachedName>, CacheError>;

    /// Store mappings; returns the number written
    async fn persist(
        &self,
        domain: NormalizationDomain,
        records: &[NormalizationRecord],
    ) -> Result<usize, CacheError>;

    /// Number of stored mappings in `domain`
    async fn count(&self, domain: NormalizationDomain) -> Result<usize, CacheError>;
}

/// SQLite-backed cache (`name_normalizations` table)
#[derive(Clone)]
pub struct SqliteNormalizationCache {
    db: SqlitePool,
}

impl SqliteNormalizationCache {
    /// Tables must already exist (see [`crate::db::init_tables`])
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NormalizationCache for SqliteNormalizationCache {
    async fn lookup(
        &self,
        domain: NormalizationDomain,
        names: &BTreeSet<String>,
    ) -> Result<HashMap<String, CachedName>, CacheError> {
        let keys: Vec<String> = names
            .iter()
            .map(|n| name_key(n))
            .filter(|k| !k.is_empty())
            .collect();

        let mut found = HashMap::new();

        for chunk in keys.chunks(LOOKUP_CHUNK_SIZE) {
            let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT original_name, canonical_name, confidence FROM name_normalizations WHERE domain = ",
            );
            query.push_bind(domain.as_str());
            query.push(" AND original_name IN (");
            let mut separated = query.separated(", ");
            for key in chunk {
                separated.push_bind(key.as_str());
            }
            separated.push_unseparated(")");

            let rows: Vec<(String, String, f64)> = query
                .build_query_as()
                .fetch_all(&self.db)
                .await
                .map_err(CacheError::Lookup)?;

            for (original_name, canonical_name, confidence) in rows {
                found.insert(
                    original_name,
                    CachedName {
                        canonical_name,
                        confidence: confidence as f32,
                    },
                );
            }
        }

        tracing::debug!(
            domain = %domain,
            requested = keys.len(),
            hits = found.len(),
            "Normalization cache lookup"
        );

        Ok(found)
    }

    async fn persist(
        &self,
        domain: NormalizationDomain,
        records: &[NormalizationRecord],
    ) -> Result<usize, CacheError> {
        let now = Utc::now().to_rfc3339();
        let mut written = 0;
        let mut failed = 0;
        let mut last_error = None;

        for record in records {
            let key = name_key(&record.original_name);
            if key.is_empty() {
                continue;
            }

            let result = sqlx::query(
                "INSERT INTO name_normalizations
                    (domain, original_name, canonical_name, confidence, source, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(domain, original_name) DO UPDATE SET
                    canonical_name = excluded.canonical_name,
                    confidence = excluded.confidence,
                    source = excluded.source,
                    updated_at = excluded.updated_at",
            )
            .bind(domain.as_str())
            .bind(&key)
            .bind(&record.normalized_name)
            .bind(f64::from(record.confidence))
            .bind(record.source.as_str())
            .bind(&now)
            .execute(&self.db)
            .await;

            match result {
                Ok(_) => written += 1,
                Err(e) => {
                    tracing::debug!(
                        domain = %domain,
                        name = %key,
                        error = %e,
                        "Cache write failed"
                    );
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(source) => Err(CacheError::Persist {
                failed,
                total: written + failed,
                source,
            }),
            None => Ok(written),
        }
    }

    async fn count(&self, domain: NormalizationDomain) -> Result<usize, CacheError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM name_normalizations WHERE domain = ?")
                .bind(domain.as_str())
                .fetch_one(&self.db)
                .await
                .map_err(CacheError::Query)?;
        Ok(count.max(0) as usize)
    }
}

/// Process-local cache for tests and `--no-cache` runs
#[derive(Default)]
pub struct InMemoryNormalizationCache {
    entries: RwLock<HashMap<(NormalizationDomain, String), CachedName>>,
}

impl InMemoryNormalizationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a mapping directly
    pub async fn insert(
        &self,
        domain: NormalizationDomain,
        original_name: &str,
        canonical_name: &str,
        confidence: f32,
    ) {
        self.entries.write().await.insert(
            (domain, name_key(original_name)),
            CachedName {
                canonical_name: canonical_name.to_string(),
                confidence,
            },
        );
    }
}

#[async_trait]
impl NormalizationCache for InMemoryNormalizationCache {
    async fn lookup(
        &self,
        domain: NormalizationDomain,
        names: &BTreeSet<String>,
    ) -> Result<HashMap<String, CachedName>, CacheError> {
        let entries = self.entries.read().await;
        Ok(names
            .iter()
            .filter_map(|name| {
                let key = name_key(name);
                entries
                    .get(&(domain, key.clone()))
                    .map(|cached| (key, cached.clone()))
            })
            .collect())
    }

    async fn persist(
        &self,
        domain: NormalizationDomain,
        records: &[NormalizationRecord],
    ) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().await;
        let mut written = 0;
        for record in records {
            let key = name_key(&record.original_name);
            if key.is_empty() {
                continue;
            }
            entries.insert(
                (domain, key),
                CachedName {
                    canonical_name: record.normalized_name.clone(),
                    confidence: record.confidence,
                },
            );
            written += 1;
        }
        Ok(written)
    }

    async fn count(&self, domain: NormalizationDomain) -> Result<usize, CacheError> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|(d, _)| *d == domain)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NormalizationSource;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_sqlite_roundtrip_is_domain_scoped() {
        let cache = SqliteNormalizationCache::new(setup_test_db().await);

        let records = vec![NormalizationRecord::new(
            "door jamb",
            "Door Jamb",
            0.92,
            NormalizationSource::Ai,
        )];
        let written = cache
            .persist(NormalizationDomain::Component, &records)
            .await
            .unwrap();
        assert_eq!(written, 1);

        let hits = cache
            .lookup(NormalizationDomain::Component, &names(&["door jamb", "window sill"]))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        let hit = &hits["door jamb"];
        assert_eq!(hit.canonical_name, "Door Jamb");
        assert!((hit.confidence - 0.92).abs() < 1e-6);

        let other_domain = cache
            .lookup(NormalizationDomain::Substrate, &names(&["door jamb"]))
            .await
            .unwrap();
        assert!(other_domain.is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_lookup_is_case_insensitive() {
        let cache = SqliteNormalizationCache::new(setup_test_db().await);
        cache
            .persist(
                NormalizationDomain::Substrate,
                &[NormalizationRecord::new("  WOOD ", "Wood", 1.0, NormalizationSource::Fallback)],
            )
            .await
            .unwrap();

        let hits = cache
            .lookup(NormalizationDomain::Substrate, &names(&["Wood"]))
            .await
            .unwrap();
        assert_eq!(hits["wood"].canonical_name, "Wood");
    }

    #[tokio::test]
    async fn test_sqlite_persist_overwrites() {
        let cache = SqliteNormalizationCache::new(setup_test_db().await);
        let domain = NormalizationDomain::Component;

        cache
            .persist(
                domain,
                &[NormalizationRecord::new(
                    "dr jamb",
                    "Dr Jamb",
                    0.5,
                    NormalizationSource::Fallback,
                )],
            )
            .await
            .unwrap();
        cache
            .persist(
                domain,
                &[NormalizationRecord::new(
                    "dr jamb",
                    "Door Jamb",
                    0.8,
                    NormalizationSource::Ai,
                )],
            )
            .await
            .unwrap();

        let hits = cache.lookup(domain, &names(&["dr jamb"])).await.unwrap();
        assert_eq!(hits["dr jamb"].canonical_name, "Door Jamb");
        assert_eq!(cache.count(domain).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_lookup_spans_chunks() {
        let cache = SqliteNormalizationCache::new(setup_test_db().await);
        let domain = NormalizationDomain::Component;

        let records: Vec<_> = (0..1200)
            .map(|i| {
                NormalizationRecord::new(
                    format!("item {}", i),
                    format!("Item {}", i),
                    1.0,
                    NormalizationSource::Fallback,
                )
            })
            .collect();
        cache.persist(domain, &records).await.unwrap();

        let all: BTreeSet<String> = (0..1200).map(|i| format!("item {}", i)).collect();
        let hits = cache.lookup(domain, &all).await.unwrap();
        assert_eq!(hits.len(), 1200);
    }

    #[tokio::test]
    async fn test_sqlite_persist_without_table_reports_failures() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let cache = SqliteNormalizationCache::new(pool);

        let err = cache
            .persist(
                NormalizationDomain::Component,
                &[
                    NormalizationRecord::new("a", "A", 1.0, NormalizationSource::Fallback),
                    NormalizationRecord::new("b", "B", 1.0, NormalizationSource::Fallback),
                ],
            )
            .await
            .unwrap_err();

        match err {
            CacheError::Persist { failed, total, .. } => {
                assert_eq!(failed, 2);
                assert_eq!(total, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_in_memory_cache() {
        let cache = InMemoryNormalizationCache::new();
        cache
            .insert(NormalizationDomain::Component, "Baseboard", "Baseboard", 0.9)
            .await;

        let hits = cache
            .lookup(NormalizationDomain::Component, &names(&["baseboard", "wall"]))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(cache.count(NormalizationDomain::Component).await.unwrap(), 1);
        assert_eq!(cache.count(NormalizationDomain::Substrate).await.unwrap(), 0);
    }
}

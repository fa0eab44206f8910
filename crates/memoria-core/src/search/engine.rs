//! SearchEngine — hybrid vector/keyword search with adaptive thresholding and camera-roll mode.

use std::collections::HashSet;
use std::sync::Mutex as StdMutex;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use tokio::sync::Mutex as AsyncMutex;

use crate::drilldown::DrilldownRegistry;
use crate::embeddings::EmbeddingClient;
use crate::error::{MemoriaError, Result};
use crate::memory::{DrilldownKind, Importance, Memory, MemoryType};
use crate::storage::ConnectionPool;

use super::keyword::KeywordSearcher;
use super::vector::{VectorIndex, VectorIndexConfig};

const THRESHOLD_CACHE_TTL: StdDuration = StdDuration::from_secs(300);

/// Search-time filters and toggles; everything optional collapses to the spec's defaults.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: usize,
    pub threshold: Option<f32>,
    pub memory_type: Option<MemoryType>,
    pub tags: Vec<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub recency_boost: bool,
    pub include_recent: Option<usize>,
    pub keyword_fallback: bool,
    pub camera_roll: bool,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub memory: Memory,
    pub similarity: f32,
    pub is_fallback: bool,
    pub drilldown_id: Option<u64>,
}

struct ThresholdCacheEntry {
    computed_at: Instant,
    threshold: f32,
    corpus_size: usize,
}

/// Owns the in-memory HNSW index for one project and orchestrates the multi-stage search
/// pipeline described in the specification's SearchEngine component.
pub struct SearchEngine {
    index: AsyncMutex<VectorIndex>,
    threshold_cache: StdMutex<Option<ThresholdCacheEntry>>,
}

impl SearchEngine {
    pub fn new(dimensions: usize) -> Result<Self> {
        let index = VectorIndex::with_config(VectorIndexConfig {
            dimensions,
            ..VectorIndexConfig::default()
        })
        .map_err(|e| MemoriaError::Internal(format!("failed to build vector index: {e}")))?;

        Ok(Self {
            index: AsyncMutex::new(index),
            threshold_cache: StdMutex::new(None),
        })
    }

    pub async fn index_memory(&self, id: &str, vector: &[f32]) -> Result<()> {
        self.index
            .lock()
            .await
            .add(id, vector)
            .map_err(|e| MemoriaError::Internal(e.to_string()))
    }

    pub async fn remove_memory(&self, id: &str) -> Result<()> {
        self.index
            .lock()
            .await
            .remove(id)
            .map(|_| ())
            .map_err(|e| MemoriaError::Internal(e.to_string()))
    }

    /// The adaptive threshold and corpus size a search would currently use for `project_path`,
    /// for callers (diagnostics, tests) that want to inspect the banding without issuing a
    /// search.
    pub async fn threshold_diagnostics(&self, pool: &ConnectionPool, project_path: &str) -> Result<(f32, usize)> {
        self.resolve_threshold(pool, project_path.to_string()).await
    }

    /// Resolve the adaptive similarity threshold for a project, caching the result for
    /// `THRESHOLD_CACHE_TTL`.
    async fn resolve_threshold(&self, pool: &ConnectionPool, project_path: String) -> Result<(f32, usize)> {
        if let Some(entry) = self.threshold_cache.lock().unwrap().as_ref() {
            if entry.computed_at.elapsed() < THRESHOLD_CACHE_TTL {
                return Ok((entry.threshold, entry.corpus_size));
            }
        }

        let corpus_size: i64 = pool
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM memories WHERE project_path = ?1 AND embedding IS NOT NULL",
                    params![project_path],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(MemoriaError::Storage)?;
        let corpus_size = corpus_size as usize;

        let threshold = if corpus_size < 10 {
            0.10
        } else if corpus_size < 100 {
            0.20
        } else if corpus_size < 1000 {
            0.30
        } else {
            0.40
        };

        *self.threshold_cache.lock().unwrap() = Some(ThresholdCacheEntry {
            computed_at: Instant::now(),
            threshold,
            corpus_size,
        });

        Ok((threshold, corpus_size))
    }

    pub async fn search(
        &self,
        pool: &ConnectionPool,
        embedder: &EmbeddingClient,
        drilldowns: Option<&DrilldownRegistry>,
        project_path: &str,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let (threshold, corpus_size) = if let Some(t) = options.threshold {
            (t, usize::MAX)
        } else {
            self.resolve_threshold(pool, project_path.to_string()).await?
        };

        let limit = if corpus_size == 0 {
            options.limit
        } else {
            options.limit.min(corpus_size.max(1))
        };

        // §4.7 step 2: never substitute a hash-based fallback vector — EmbeddingUnavailable
        // propagates straight to the caller.
        let query_embedding = embedder.embed(query).await?;

        let hits = {
            let index = self.index.lock().await;
            index
                .search(&query_embedding.vector, limit.max(options.limit) * 4 + limit)
                .map_err(|e| MemoriaError::Internal(e.to_string()))?
        };

        let ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
        let mut memories = fetch_memories(pool, project_path.to_string(), ids).await?;

        let mut scored: Vec<SearchResult> = Vec::new();
        for (id, distance) in &hits {
            let Some(memory) = memories.remove(id) else {
                continue;
            };
            if !passes_filters(&memory, &options) {
                continue;
            }

            let mut similarity = *distance;
            if options.recency_boost {
                similarity *= recency_multiplier(&memory);
            }

            if similarity >= threshold {
                scored.push(SearchResult {
                    memory,
                    similarity,
                    is_fallback: false,
                    drilldown_id: None,
                });
            }
        }

        if let Some(n) = options.include_recent {
            let seen: HashSet<String> = scored.iter().map(|r| r.memory.id.clone()).collect();
            for memory in fetch_recent(pool, project_path.to_string(), n).await? {
                if !seen.contains(&memory.id) && passes_filters(&memory, &options) {
                    scored.push(SearchResult {
                        memory,
                        similarity: 0.0,
                        is_fallback: false,
                        drilldown_id: None,
                    });
                }
            }
        }

        if scored.is_empty() && options.keyword_fallback {
            let hits = KeywordSearcher::search(pool, project_path.to_string(), query, limit)
                .await
                .map_err(MemoriaError::Storage)?;
            let ids: Vec<String> = hits.iter().map(|h| h.memory_id.clone()).collect();
            let mut memories = fetch_memories(pool, project_path.to_string(), ids).await?;
            for hit in hits {
                if let Some(memory) = memories.remove(&hit.memory_id) {
                    if passes_filters(&memory, &options) {
                        scored.push(SearchResult {
                            memory,
                            similarity: 0.0,
                            is_fallback: true,
                            drilldown_id: None,
                        });
                    }
                }
            }
        }

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
        });
        scored.truncate(options.limit.max(1));

        if options.camera_roll {
            if let Some(registry) = drilldowns {
                for result in &mut scored {
                    result.drilldown_id =
                        Some(registry.register(result.memory.id.clone(), DrilldownKind::Memory));
                }
            }
        }

        Ok(scored)
    }
}

fn passes_filters(memory: &Memory, options: &SearchOptions) -> bool {
    if let Some(expected) = options.memory_type {
        if memory.memory_type != expected {
            return false;
        }
    }
    if !options.tags.is_empty() && !options.tags.iter().any(|t| memory.tags.contains(t)) {
        return false;
    }
    if let Some(from) = options.date_from {
        if memory.created_at < from {
            return false;
        }
    }
    if let Some(to) = options.date_to {
        if memory.created_at > to {
            return false;
        }
    }
    true
}

fn recency_multiplier(memory: &Memory) -> f32 {
    let reference = memory.last_accessed_at.unwrap_or(memory.created_at);
    let age = Utc::now().signed_duration_since(reference);
    if age <= chrono::Duration::hours(1) {
        1.20
    } else if age <= chrono::Duration::hours(24) {
        1.10
    } else {
        1.0
    }
}

async fn fetch_memories(
    pool: &ConnectionPool,
    project_path: String,
    ids: Vec<String>,
) -> Result<std::collections::HashMap<String, Memory>> {
    if ids.is_empty() {
        return Ok(std::collections::HashMap::new());
    }
    let now = Utc::now().to_rfc3339();
    pool.with_conn(move |conn| {
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT {COLUMNS} FROM memories
             WHERE project_path = ? AND id IN ({placeholders})
               AND (expires_at IS NULL OR expires_at > ?)"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut query_params: Vec<&dyn rusqlite::ToSql> = vec![&project_path];
        for id in &ids {
            query_params.push(id);
        }
        query_params.push(&now);
        let rows = stmt.query_map(query_params.as_slice(), row_to_memory)?;
        let mut map = std::collections::HashMap::new();
        for memory in rows {
            let memory = memory?;
            map.insert(memory.id.clone(), memory);
        }
        Ok(map)
    })
    .await
    .map_err(MemoriaError::Storage)
}

async fn fetch_recent(pool: &ConnectionPool, project_path: String, limit: usize) -> Result<Vec<Memory>> {
    let now = Utc::now().to_rfc3339();
    pool.with_conn(move |conn| {
        let sql = format!(
            "SELECT {COLUMNS} FROM memories
             WHERE project_path = ?1 AND (expires_at IS NULL OR expires_at > ?2)
             ORDER BY created_at DESC LIMIT ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![project_path, now, limit as i64], row_to_memory)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
    })
    .await
    .map_err(MemoriaError::Storage)
}

const COLUMNS: &str = "id, content, memory_type, importance, tags, metadata, embedding, \
    project_path, content_hash, created_at, updated_at, access_count, last_accessed_at, \
    expires_at, related_memories, consolidated_from";

pub fn row_to_memory(row: &Row) -> rusqlite::Result<Memory> {
    let tags: String = row.get(4)?;
    let metadata: String = row.get(5)?;
    let embedding_blob: Option<Vec<u8>> = row.get(6)?;
    let related: String = row.get(14)?;
    let consolidated_from: String = row.get(15)?;

    Ok(Memory {
        id: row.get(0)?,
        content: row.get(1)?,
        memory_type: MemoryType::parse_name(&row.get::<_, String>(2)?),
        importance: Importance::parse_name(&row.get::<_, String>(3)?),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        embedding: embedding_blob.map(|b| {
            b.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        }),
        project_path: row.get(7)?,
        content_hash: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        access_count: row.get(11)?,
        last_accessed_at: row.get(12)?,
        expires_at: row.get(13)?,
        related_memories: serde_json::from_str(&related).unwrap_or_default(),
        consolidated_from: serde_json::from_str(&consolidated_from).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_multiplier_boosts_recent_access() {
        let mut memory = sample_memory();
        memory.last_accessed_at = Some(Utc::now());
        assert_eq!(recency_multiplier(&memory), 1.20);

        memory.last_accessed_at = Some(Utc::now() - chrono::Duration::hours(12));
        assert_eq!(recency_multiplier(&memory), 1.10);

        memory.last_accessed_at = Some(Utc::now() - chrono::Duration::days(3));
        assert_eq!(recency_multiplier(&memory), 1.0);
    }

    #[test]
    fn filters_reject_mismatched_memory_type() {
        let memory = sample_memory();
        let options = SearchOptions {
            memory_type: Some(MemoryType::Episodic),
            ..Default::default()
        };
        assert!(!passes_filters(&memory, &options));
    }

    fn sample_memory() -> Memory {
        Memory {
            id: "a".into(),
            content: "hello".into(),
            memory_type: MemoryType::Semantic,
            importance: Importance::Medium,
            tags: vec![],
            metadata: serde_json::Value::Null,
            embedding: None,
            project_path: "/p".into(),
            content_hash: "h".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            access_count: 0,
            last_accessed_at: None,
            expires_at: None,
            related_memories: vec![],
            consolidated_from: vec![],
        }
    }
}

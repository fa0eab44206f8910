//! ConsolidationEngine — clusters related memories and merges each cluster into one.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::params;

use crate::embeddings::average_and_normalize;
use crate::error::{MemoriaError, Result};
use crate::memory::{Importance, Memory, MemoryType};
use crate::search::{row_to_memory, SearchEngine};
use crate::storage::ConnectionPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsolidationStrategy {
    Similarity,
    Temporal,
    TagBased,
    Importance,
}

#[derive(Debug, Clone)]
pub struct ConsolidationOptions {
    pub strategy: ConsolidationStrategy,
    pub dry_run: bool,
    pub similarity_threshold: f32,
    pub temporal_window_secs: i64,
    pub tag_jaccard_threshold: f32,
    pub min_cluster_size: usize,
}

impl Default for ConsolidationOptions {
    fn default() -> Self {
        Self {
            strategy: ConsolidationStrategy::Similarity,
            dry_run: false,
            similarity_threshold: 0.85,
            temporal_window_secs: 3600,
            tag_jaccard_threshold: 0.5,
            min_cluster_size: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cluster {
    pub members: Vec<Memory>,
}

#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    pub clusters_found: usize,
    pub memories_merged: usize,
    pub new_memory_ids: Vec<String>,
    pub dry_run: bool,
}

pub struct ConsolidationEngine;

impl ConsolidationEngine {
    pub async fn run(
        pool: &ConnectionPool,
        search: &SearchEngine,
        project_path: String,
        options: ConsolidationOptions,
    ) -> Result<ConsolidationReport> {
        let candidates = fetch_candidates(pool, project_path.clone()).await?;
        if candidates.len() < options.min_cluster_size {
            return Ok(ConsolidationReport {
                dry_run: options.dry_run,
                ..Default::default()
            });
        }

        let clusters = match options.strategy {
            ConsolidationStrategy::Similarity => cluster_by_similarity(&candidates, options.similarity_threshold),
            ConsolidationStrategy::Temporal => cluster_by_temporal_window(&candidates, options.temporal_window_secs),
            ConsolidationStrategy::TagBased => cluster_by_tags(&candidates, options.tag_jaccard_threshold),
            ConsolidationStrategy::Importance => cluster_by_importance(&candidates, options.similarity_threshold),
        };

        let eligible: Vec<Cluster> = clusters
            .into_iter()
            .filter(|c| c.members.len() >= options.min_cluster_size)
            .collect();

        let mut report = ConsolidationReport {
            clusters_found: eligible.len(),
            dry_run: options.dry_run,
            ..Default::default()
        };

        if options.dry_run {
            return Ok(report);
        }

        for cluster in eligible {
            let new_id = merge_cluster(pool, search, &project_path, cluster).await?;
            report.memories_merged += 1;
            report.new_memory_ids.push(new_id);
        }

        Ok(report)
    }
}

async fn fetch_candidates(pool: &ConnectionPool, project_path: String) -> Result<Vec<Memory>> {
    let now = Utc::now().to_rfc3339();
    pool.with_conn(move |conn| {
        let sql = "SELECT id, content, memory_type, importance, tags, metadata, embedding, \
            project_path, content_hash, created_at, updated_at, access_count, last_accessed_at, \
            expires_at, related_memories, consolidated_from FROM memories \
            WHERE project_path = ?1 AND memory_type != 'consolidated' \
              AND (expires_at IS NULL OR expires_at > ?2)";
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![project_path, now], row_to_memory)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
    })
    .await
    .map_err(MemoriaError::Storage)
}

fn cluster_by_similarity(memories: &[Memory], threshold: f32) -> Vec<Cluster> {
    let mut visited = vec![false; memories.len()];
    let mut clusters = Vec::new();

    for i in 0..memories.len() {
        if visited[i] || memories[i].embedding.is_none() {
            continue;
        }
        let mut members = vec![i];
        visited[i] = true;
        // Single-link: grow the cluster while any unvisited memory is similar enough to any
        // member already in it.
        loop {
            let mut grown = false;
            for j in 0..memories.len() {
                if visited[j] || memories[j].embedding.is_none() {
                    continue;
                }
                let similar_to_member = members.iter().any(|&m| {
                    let (Some(a), Some(b)) = (&memories[m].embedding, &memories[j].embedding) else {
                        return false;
                    };
                    crate::embeddings::cosine_similarity(a, b) >= threshold
                });
                if similar_to_member {
                    members.push(j);
                    visited[j] = true;
                    grown = true;
                }
            }
            if !grown {
                break;
            }
        }
        if members.len() > 1 {
            clusters.push(Cluster {
                members: members.into_iter().map(|i| memories[i].clone()).collect(),
            });
        }
    }

    clusters
}

fn cluster_by_temporal_window(memories: &[Memory], window_secs: i64) -> Vec<Cluster> {
    let mut sorted: Vec<&Memory> = memories.iter().collect();
    sorted.sort_by_key(|m| m.created_at);

    let mut clusters = Vec::new();
    let mut current: Vec<Memory> = Vec::new();

    for memory in sorted {
        if let Some(last) = current.last() {
            let gap = memory.created_at.signed_duration_since(last.created_at);
            if gap > chrono::Duration::seconds(window_secs) {
                if current.len() > 1 {
                    clusters.push(Cluster { members: std::mem::take(&mut current) });
                } else {
                    current.clear();
                }
            }
        }
        current.push(memory.clone());
    }
    if current.len() > 1 {
        clusters.push(Cluster { members: current });
    }

    clusters
}

fn cluster_by_tags(memories: &[Memory], jaccard_threshold: f32) -> Vec<Cluster> {
    let mut visited = vec![false; memories.len()];
    let mut clusters = Vec::new();

    for i in 0..memories.len() {
        if visited[i] {
            continue;
        }
        let tags_i: HashSet<&String> = memories[i].tags.iter().collect();
        if tags_i.is_empty() {
            continue;
        }
        let mut members = vec![i];
        visited[i] = true;

        for j in (i + 1)..memories.len() {
            if visited[j] {
                continue;
            }
            let tags_j: HashSet<&String> = memories[j].tags.iter().collect();
            if jaccard(&tags_i, &tags_j) >= jaccard_threshold {
                members.push(j);
                visited[j] = true;
            }
        }

        if members.len() > 1 {
            clusters.push(Cluster {
                members: members.into_iter().map(|i| memories[i].clone()).collect(),
            });
        }
    }

    clusters
}

fn jaccard(a: &HashSet<&String>, b: &HashSet<&String>) -> f32 {
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

fn cluster_by_importance(memories: &[Memory], similarity_threshold: f32) -> Vec<Cluster> {
    let mut seeds: Vec<&Memory> = memories.iter().filter(|m| m.importance >= Importance::High).collect();
    seeds.sort_by(|a, b| b.importance.cmp(&a.importance));

    let mut used: HashSet<String> = HashSet::new();
    let mut clusters = Vec::new();

    for seed in seeds {
        if used.contains(&seed.id) {
            continue;
        }
        let Some(seed_embedding) = &seed.embedding else { continue };
        let mut members = vec![seed.clone()];
        used.insert(seed.id.clone());

        for candidate in memories {
            if used.contains(&candidate.id) {
                continue;
            }
            if let Some(embedding) = &candidate.embedding {
                if crate::embeddings::cosine_similarity(seed_embedding, embedding) >= similarity_threshold {
                    members.push(candidate.clone());
                    used.insert(candidate.id.clone());
                }
            }
        }

        if members.len() > 1 {
            clusters.push(Cluster { members });
        }
    }

    clusters
}

async fn merge_cluster(
    pool: &ConnectionPool,
    search: &SearchEngine,
    project_path: &str,
    cluster: Cluster,
) -> Result<String> {
    let mut seen_snippets = HashSet::new();
    let mut content_parts = Vec::new();
    let mut tags: HashSet<String> = HashSet::new();
    let mut max_importance = Importance::Trivial;
    let mut embeddings = Vec::new();
    let mut source_ids = Vec::new();

    for memory in &cluster.members {
        if seen_snippets.insert(memory.content.clone()) {
            content_parts.push(memory.content.clone());
        }
        tags.extend(memory.tags.iter().cloned());
        if memory.importance > max_importance {
            max_importance = memory.importance;
        }
        if let Some(embedding) = &memory.embedding {
            embeddings.push(embedding.clone());
        }
        source_ids.push(memory.id.clone());
    }

    let merged_content = content_parts.join("\n---\n");
    let merged_embedding = average_and_normalize(&embeddings);
    let new_id = crate::memory::content_hash(None, &merged_content, project_path);
    let new_id = format!("consolidated-{new_id}");
    let now = Utc::now().to_rfc3339();
    let tags_json = serde_json::to_string(&tags.into_iter().collect::<Vec<_>>())
        .map_err(|e| MemoriaError::Internal(e.to_string()))?;
    let consolidated_from_json =
        serde_json::to_string(&source_ids).map_err(|e| MemoriaError::Internal(e.to_string()))?;
    let embedding_blob = merged_embedding.as_ref().map(|v| {
        let mut out = Vec::with_capacity(v.len() * 4);
        for f in v {
            out.extend_from_slice(&f.to_le_bytes());
        }
        out
    });
    let embedding_dim = merged_embedding.as_ref().map(|v| v.len() as i64);

    let new_id_for_insert = new_id.clone();
    let project_path_owned = project_path.to_string();
    let source_ids_for_delete = source_ids.clone();

    pool.with_conn(move |conn| {
        let tx = conn.unchecked_transaction();
        tx.execute(
            "INSERT INTO memories (
                id, content, memory_type, importance, tags, metadata, embedding, embedding_dim,
                project_path, content_hash, created_at, updated_at, access_count,
                consolidated_from
             ) VALUES (?1, ?2, 'consolidated', ?3, ?4, '{}', ?5, ?6, ?7, ?8, ?9, ?9, 0, ?10)",
            params![
                new_id_for_insert,
                merged_content,
                max_importance.as_str(),
                tags_json,
                embedding_blob,
                embedding_dim,
                project_path_owned,
                new_id_for_insert.clone(),
                now,
                consolidated_from_json,
            ],
        )?;

        for source_id in &source_ids_for_delete {
            tx.execute(
                "DELETE FROM access_transitions WHERE from_memory_id = ?1 OR to_memory_id = ?1",
                params![source_id],
            )?;
            tx.execute("DELETE FROM memories WHERE id = ?1", params![source_id])?;
        }

        tx.commit()
    })
    .await
    .map_err(MemoriaError::Storage)?;

    for source_id in &source_ids {
        search.remove_memory(source_id).await?;
    }
    if let Some(vector) = &merged_embedding {
        search.index_memory(&new_id, vector).await?;
    }

    Ok(new_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryType;

    fn memory(id: &str, content: &str, embedding: Option<Vec<f32>>, tags: Vec<&str>, importance: Importance) -> Memory {
        Memory {
            id: id.into(),
            content: content.into(),
            memory_type: MemoryType::Semantic,
            importance,
            tags: tags.into_iter().map(String::from).collect(),
            metadata: serde_json::Value::Null,
            embedding,
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

    #[test]
    fn similarity_clustering_groups_near_duplicates() {
        let memories = vec![
            memory("a", "one", Some(vec![1.0, 0.0]), vec![], Importance::Medium),
            memory("b", "two", Some(vec![0.99, 0.01]), vec![], Importance::Medium),
            memory("c", "three", Some(vec![0.0, 1.0]), vec![], Importance::Medium),
        ];
        let clusters = cluster_by_similarity(&memories, 0.9);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 2);
    }

    #[test]
    fn tag_clustering_respects_jaccard_threshold() {
        let memories = vec![
            memory("a", "x", None, vec!["rust", "async"], Importance::Medium),
            memory("b", "y", None, vec!["rust", "async", "tokio"], Importance::Medium),
            memory("c", "z", None, vec!["cooking"], Importance::Medium),
        ];
        let clusters = cluster_by_tags(&memories, 0.5);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 2);
    }

    #[test]
    fn importance_ordering_is_total() {
        assert!(Importance::Critical > Importance::High);
        assert!(Importance::High > Importance::Medium);
        assert!(Importance::Medium > Importance::Low);
        assert!(Importance::Low > Importance::Trivial);
    }
}

//! MemoryStore — CRUD over the `memories` table, embedding-aware and project-scoped.

use chrono::Utc;
use rusqlite::params;
use sha2::{Digest, Sha256};

use crate::embeddings::{EmbeddingClient, EmbeddingQueue};
use crate::error::{MemoriaError, Result};
use crate::search::{row_to_memory, SearchEngine};
use crate::storage::ConnectionPool;

use super::types::new_id;
use super::{Importance, Memory, MemoryInput, MemoryType};

/// Compute the dedup hash for a memory: `sha256(role + ":" + trim(content) + "|" + project_path)`,
/// hex-encoded and truncated to 16 characters. Role-significant (not lowercased) so
/// `[USER] ...` and `[ASSISTANT] ...` turns extracted from the same summary never collide.
pub fn content_hash(role: Option<&str>, content: &str, project_path: &str) -> String {
    let role = role.unwrap_or("");
    let input = format!("{role}:{}|{project_path}", content.trim());
    let digest = Sha256::digest(input.as_bytes());
    let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    hex[..16].to_string()
}

pub struct MemoryStore;

impl MemoryStore {
    /// Insert a memory, deduping on `(project_path, content_hash)`. Returns `(id, inserted)`;
    /// `inserted = false` means an identical memory already existed and nothing changed.
    pub async fn insert(
        pool: &ConnectionPool,
        embedder: &EmbeddingClient,
        queue: &EmbeddingQueue,
        search: &SearchEngine,
        schema_dimension: Option<usize>,
        input: MemoryInput,
    ) -> Result<(String, bool)> {
        let hash = content_hash(input.role.as_deref(), &input.content, &input.project_path);

        let embedding = match input.embedding {
            Some(vector) => {
                if let Some(expected) = schema_dimension {
                    if vector.len() != expected {
                        return Err(MemoriaError::SchemaMismatch {
                            expected,
                            actual: vector.len(),
                        });
                    }
                }
                Some(vector)
            }
            None => match embedder.embed(&input.content).await {
                Ok(embedding) => Some(embedding.vector),
                Err(e) if e.is_transient() => {
                    if let Err(queue_err) = queue.enqueue(pool, input.content.clone(), 0).await {
                        tracing::warn!(error = %queue_err, original_error = %e, "failed to enqueue embedding fallback");
                    }
                    None
                }
                Err(e) => return Err(e),
            },
        };

        let id = new_id();
        let now = Utc::now();
        let mut metadata = input.metadata;
        if let Some(obj) = metadata.as_object_mut() {
            obj.insert("contentHash".to_string(), serde_json::Value::String(hash.clone()));
        } else {
            metadata = serde_json::json!({ "contentHash": hash });
        }

        let tags_json = serde_json::to_string(&input.tags).map_err(|e| MemoriaError::Internal(e.to_string()))?;
        let metadata_json = serde_json::to_string(&metadata).map_err(|e| MemoriaError::Internal(e.to_string()))?;
        let embedding_blob = embedding.as_ref().map(|v| encode_f32_blob(v));
        let embedding_dim = embedding.as_ref().map(|v| v.len() as i64);

        let id_for_insert = id.clone();
        let project_path = input.project_path.clone();
        let memory_type = input.memory_type;
        let importance = input.importance;
        let expires_at = input.expires_at;
        let now_str = now.to_rfc3339();

        let inserted: bool = pool
            .with_conn(move |conn| {
                let changed = conn.execute(
                    "INSERT INTO memories (
                        id, content, memory_type, importance, tags, metadata, embedding,
                        embedding_dim, project_path, content_hash, created_at, updated_at,
                        access_count, expires_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, 0, ?12)
                     ON CONFLICT (project_path, content_hash) DO NOTHING",
                    params![
                        id_for_insert,
                        input.content,
                        memory_type.as_str(),
                        importance.as_str(),
                        tags_json,
                        metadata_json,
                        embedding_blob,
                        embedding_dim,
                        project_path,
                        hash,
                        now_str,
                        expires_at.map(|t: chrono::DateTime<Utc>| t.to_rfc3339()),
                    ],
                )?;
                Ok(changed > 0)
            })
            .await
            .map_err(MemoriaError::Storage)?;

        if inserted {
            if let Some(vector) = &embedding {
                search.index_memory(&id, vector).await?;
            }
        }

        Ok((id, inserted))
    }

    pub async fn get(pool: &ConnectionPool, project_path: String, id: String) -> Result<Option<Memory>> {
        pool.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM memories WHERE id = ?1 AND project_path = ?2"),
                params![id, project_path],
                row_to_memory,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(e),
            })
        })
        .await
        .map_err(MemoriaError::Storage)
    }

    /// Record an access: bump `access_count`, set `last_accessed_at`.
    pub async fn record_access(pool: &ConnectionPool, id: String) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        pool.with_conn(move |conn| {
            conn.execute(
                "UPDATE memories SET access_count = access_count + 1, last_accessed_at = ?1 WHERE id = ?2",
                params![now, id],
            )
            .map(|_| ())
        })
        .await
        .map_err(MemoriaError::Storage)
    }

    /// Partial patch; regenerates the embedding only if `content` changed.
    pub async fn update(
        pool: &ConnectionPool,
        embedder: &EmbeddingClient,
        search: &SearchEngine,
        project_path: String,
        id: String,
        new_content: Option<String>,
        new_importance: Option<Importance>,
        new_tags: Option<Vec<String>>,
    ) -> Result<bool> {
        let Some(mut memory) = Self::get(pool, project_path.clone(), id.clone()).await? else {
            return Ok(false);
        };

        let content_changed = new_content.as_ref().is_some_and(|c| *c != memory.content);
        if let Some(content) = new_content {
            memory.content = content;
        }
        if let Some(importance) = new_importance {
            memory.importance = importance;
        }
        if let Some(tags) = new_tags {
            memory.tags = tags;
        }

        let new_embedding = if content_changed {
            Some(embedder.embed(&memory.content).await?.vector)
        } else {
            None
        };

        let now = Utc::now().to_rfc3339();
        let tags_json = serde_json::to_string(&memory.tags).map_err(|e| MemoriaError::Internal(e.to_string()))?;
        let embedding_blob = new_embedding.as_ref().map(|v| encode_f32_blob(v));
        let content = memory.content.clone();
        let importance = memory.importance;
        let id_for_update = id.clone();
        let project_path_for_update = project_path.clone();

        pool.with_conn(move |conn| {
            if let Some(blob) = embedding_blob {
                conn.execute(
                    "UPDATE memories SET content = ?1, importance = ?2, tags = ?3, embedding = ?4,
                        embedding_dim = ?5, updated_at = ?6
                     WHERE id = ?7 AND project_path = ?8",
                    params![content, importance.as_str(), tags_json, blob, blob_len(&blob), now, id_for_update, project_path_for_update],
                )
            } else {
                conn.execute(
                    "UPDATE memories SET content = ?1, importance = ?2, tags = ?3, updated_at = ?4
                     WHERE id = ?5 AND project_path = ?6",
                    params![content, importance.as_str(), tags_json, now, id_for_update, project_path_for_update],
                )
            }
            .map(|n| n > 0)
        })
        .await
        .map_err(MemoriaError::Storage)?;

        if let Some(vector) = &new_embedding {
            search.index_memory(&id, vector).await?;
        }

        Ok(true)
    }

    /// Delete a single memory, cascading to AccessTransitions and HotPaths that reference it.
    pub async fn delete(pool: &ConnectionPool, search: &SearchEngine, project_path: String, id: String) -> Result<bool> {
        let id_for_delete = id.clone();
        let project_for_delete = project_path.clone();
        let deleted = pool
            .with_conn(move |conn| {
                let tx = conn.unchecked_transaction();
                tx.execute(
                    "DELETE FROM access_transitions WHERE project_path = ?1 AND (from_memory_id = ?2 OR to_memory_id = ?2)",
                    params![project_for_delete, id_for_delete],
                )?;
                let n = tx.execute(
                    "DELETE FROM memories WHERE id = ?1 AND project_path = ?2",
                    params![id_for_delete, project_for_delete],
                )?;
                tx.commit()?;
                Ok(n > 0)
            })
            .await
            .map_err(MemoriaError::Storage)?;

        if deleted {
            search.remove_memory(&id).await?;
        }
        Ok(deleted)
    }

    /// Delete every memory whose `expires_at` has passed, project-scoped.
    pub async fn delete_expired(pool: &ConnectionPool, project_path: String) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        pool.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM memories WHERE project_path = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
                params![project_path, now],
            )
        })
        .await
        .map_err(MemoriaError::Storage)
    }
}

fn encode_f32_blob(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for f in v {
        out.extend_from_slice(&f.to_le_bytes());
    }
    out
}

fn blob_len(blob: &[u8]) -> i64 {
    (blob.len() / 4) as i64
}

const COLUMNS: &str = "id, content, memory_type, importance, tags, metadata, embedding, \
    project_path, content_hash, created_at, updated_at, access_count, last_accessed_at, \
    expires_at, related_memories, consolidated_from";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_role_significant() {
        let user = content_hash(Some("user"), "hello", "/p");
        let assistant = content_hash(Some("assistant"), "hello", "/p");
        assert_ne!(user, assistant);
    }

    #[test]
    fn content_hash_trims_whitespace() {
        let a = content_hash(None, "hello", "/p");
        let b = content_hash(None, "  hello  ", "/p");
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_is_sixteen_hex_chars() {
        let hash = content_hash(None, "hello", "/p");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn content_hash_scopes_by_project() {
        let a = content_hash(None, "hello", "/p1");
        let b = content_hash(None, "hello", "/p2");
        assert_ne!(a, b);
    }
}

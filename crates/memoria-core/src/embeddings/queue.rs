//! EmbeddingQueue — durable overflow path used when EmbeddingClient is unreachable.
//!
//! `drain` claims rows with `BEGIN IMMEDIATE` + an `UPDATE ... RETURNING` status flip, SQLite's
//! idiom for the spec's `SELECT ... FOR UPDATE SKIP LOCKED`, since SQLite has no row-level
//! locking. A single in-process `tokio::sync::Mutex` ensures only one drain runs per project at
//! a time; a concurrent caller returns immediately rather than blocking.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::params;
use tokio::sync::{oneshot, Mutex as AsyncMutex};

use crate::error::{MemoriaError, Result, StorageResult};
use crate::storage::ConnectionPool;

use super::math::Embedding;

/// Maps queue row ids to the oneshot senders that resolve `enqueue`'s returned future — the
/// "hidden promise-resolver" redesign note's explicit map, never a hidden global.
type PendingRequests = StdMutex<HashMap<i64, oneshot::Sender<Result<Embedding>>>>;

pub struct EmbeddingQueue {
    project_id: String,
    pending: PendingRequests,
    draining: AsyncMutex<()>,
}

struct ClaimedRow {
    id: i64,
    text: String,
}

impl EmbeddingQueue {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            pending: StdMutex::new(HashMap::new()),
            draining: AsyncMutex::new(()),
        }
    }

    /// Insert a pending row and return a future that resolves once `drain` successfully embeds
    /// it. `enqueue` itself never blocks on the embedder.
    pub async fn enqueue(
        &self,
        pool: &ConnectionPool,
        text: String,
        priority: i64,
    ) -> Result<oneshot::Receiver<Result<Embedding>>> {
        let project_id = self.project_id.clone();
        let now = Utc::now().to_rfc3339();
        let text_for_insert = text.clone();

        let row_id: i64 = pool
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO embedding_queue (project_id, text, priority, status, created_at)
                     VALUES (?1, ?2, ?3, 'pending', ?4)",
                    params![project_id, text_for_insert, priority, now],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(MemoriaError::Storage)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(row_id, tx);
        Ok(rx)
    }

    /// Claim up to `batch_size` pending rows, embed each with `embed_fn`, and persist the
    /// result. Commits per-row so a crash mid-batch loses at most one row's progress. Returns
    /// the number of rows processed (successfully or not).
    pub async fn drain<F, Fut>(&self, pool: &ConnectionPool, batch_size: usize, embed_fn: F) -> Result<usize>
    where
        F: Fn(String) -> Fut,
        Fut: std::future::Future<Output = Result<Embedding>>,
    {
        let Ok(_guard) = self.draining.try_lock() else {
            return Ok(0);
        };

        let project_id = self.project_id.clone();
        let claimed: Vec<ClaimedRow> = pool
            .with_conn(move |conn| claim_pending(conn, &project_id, batch_size))
            .await
            .map_err(MemoriaError::Storage)?;

        let mut processed = 0;
        for row in claimed {
            let outcome = embed_fn(row.text).await;
            self.finish_row(pool, row.id, outcome).await?;
            processed += 1;
        }

        Ok(processed)
    }

    async fn finish_row(&self, pool: &ConnectionPool, row_id: i64, outcome: Result<Embedding>) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        match &outcome {
            Ok(embedding) => {
                let blob = bincode_embedding(embedding);
                pool.with_conn(move |conn| {
                    conn.execute(
                        "UPDATE embedding_queue SET status = 'completed', embedding = ?1, processed_at = ?2
                         WHERE id = ?3",
                        params![blob, now, row_id],
                    )
                    .map(|_| ())
                })
                .await
                .map_err(MemoriaError::Storage)?;
            }
            Err(e) => {
                let error_msg = e.to_string();
                pool.with_conn(move |conn| {
                    conn.execute(
                        "UPDATE embedding_queue SET status = 'failed', error = ?1, processed_at = ?2
                         WHERE id = ?3",
                        params![error_msg, now, row_id],
                    )
                    .map(|_| ())
                })
                .await
                .map_err(MemoriaError::Storage)?;
            }
        }

        if let Some(tx) = self.pending.lock().unwrap().remove(&row_id) {
            let _ = tx.send(outcome);
        }
        // If there was no pending future (process restarted since enqueue), the embedding is
        // still persisted above and visible to any query joining on `id`.

        Ok(())
    }

    /// Delete completed/failed rows older than `older_than_days`.
    pub async fn cleanup(&self, pool: &ConnectionPool, older_than_days: i64) -> Result<usize> {
        let cutoff = (Utc::now() - ChronoDuration::days(older_than_days)).to_rfc3339();
        pool.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM embedding_queue
                 WHERE status IN ('completed', 'failed') AND processed_at < ?1",
                params![cutoff],
            )
        })
        .await
        .map_err(MemoriaError::Storage)
    }
}

fn claim_pending(conn: &rusqlite::Connection, project_id: &str, batch_size: usize) -> rusqlite::Result<Vec<ClaimedRow>> {
    conn.execute_batch("BEGIN IMMEDIATE;")?;

    let claim_result = (|| -> rusqlite::Result<Vec<ClaimedRow>> {
        let ids: Vec<i64> = {
            let mut stmt = conn.prepare(
                "SELECT id FROM embedding_queue
                 WHERE project_id = ?1 AND status = 'pending'
                 ORDER BY priority DESC, created_at ASC
                 LIMIT ?2",
            )?;
            stmt.query_map(params![project_id, batch_size as i64], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            let text: Option<String> = conn
                .query_row(
                    "UPDATE embedding_queue SET status = 'processing' WHERE id = ?1 AND status = 'pending'
                     RETURNING text",
                    params![id],
                    |row| row.get(0),
                )
                .ok();
            if let Some(text) = text {
                claimed.push(ClaimedRow { id, text });
            }
        }
        Ok(claimed)
    })();

    match claim_result {
        Ok(rows) => {
            conn.execute_batch("COMMIT;")?;
            Ok(rows)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK;");
            Err(e)
        }
    }
}

/// Serialize an embedding's vector as a little-endian f32 BLOB.
fn bincode_embedding(embedding: &Embedding) -> Vec<u8> {
    let mut out = Vec::with_capacity(embedding.vector.len() * 4);
    for f in &embedding.vector {
        out.extend_from_slice(&f.to_le_bytes());
    }
    out
}

#[allow(dead_code)]
fn decode_embedding(blob: &[u8]) -> Embedding {
    let vector = blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Embedding::new(vector)
}

#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
struct QueueCreatedAt(DateTime<Utc>);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SchemaManager;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn test_pool() -> (tempfile::TempDir, ConnectionPool) {
        let dir = tempdir().unwrap();
        let mgr = SchemaManager::new(dir.path(), "mem_test");
        let pool = ConnectionPool::open(mgr.db_path(), 4, Duration::from_secs(30)).unwrap();
        mgr.ensure_schema(&pool).await.unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn enqueue_then_drain_resolves_future() {
        let (_dir, pool) = test_pool().await;
        let queue = EmbeddingQueue::new("proj");

        let rx = queue.enqueue(&pool, "hello world".to_string(), 0).await.unwrap();

        let processed = queue
            .drain(&pool, 10, |text| async move { Ok(Embedding::new(vec![text.len() as f32])) })
            .await
            .unwrap();
        assert_eq!(processed, 1);

        let embedding = rx.await.unwrap().unwrap();
        assert_eq!(embedding.vector, vec![11.0]);
    }

    #[tokio::test]
    async fn concurrent_drain_returns_zero_without_blocking() {
        let (_dir, pool) = test_pool().await;
        let queue = std::sync::Arc::new(EmbeddingQueue::new("proj"));
        let _rx = queue.enqueue(&pool, "x".to_string(), 0).await.unwrap();

        let guard = queue.draining.lock().await;
        let processed = queue
            .drain(&pool, 10, |_| async { Ok(Embedding::new(vec![0.0])) })
            .await
            .unwrap();
        assert_eq!(processed, 0);
        drop(guard);
    }

    #[tokio::test]
    async fn cleanup_deletes_old_completed_rows() {
        let (_dir, pool) = test_pool().await;
        pool.with_conn(|conn| {
            conn.execute(
                "INSERT INTO embedding_queue (project_id, text, status, created_at, processed_at)
                 VALUES ('proj', 'old', 'completed', datetime('now', '-30 days'), datetime('now', '-30 days'))",
                [],
            )
        })
        .await
        .unwrap();

        let queue = EmbeddingQueue::new("proj");
        let deleted = queue.cleanup(&pool, 7).await.unwrap();
        assert_eq!(deleted, 1);
    }
}

//! SchemaManager — per-project schema creation, migration, and embedding-dimension alignment.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::params;

use super::migrations::apply_migrations;
use super::pool::ConnectionPool;
use crate::error::{StorageError, StorageResult};

/// HNSW index build parameters, matching the teacher's own `VectorIndex` defaults
/// (`DEFAULT_CONNECTIVITY`), which happen to already equal the spec's required m=16.
pub const HNSW_CONNECTIVITY: usize = 16;
pub const HNSW_EXPANSION_ADD: usize = 128;
pub const HNSW_EXPANSION_SEARCH: usize = 64;

/// A memory row exported verbatim before a dimension-change rebuild discards its embedding.
/// Offered to collaborators that want to preserve old rows elsewhere; the rebuild itself
/// always proceeds regardless of whether this hook is called.
#[derive(Debug, Clone)]
pub struct ExportedMemory {
    pub id: String,
    pub content: String,
    pub tags: String,
    pub metadata: String,
}

/// Owns schema creation/migration and embedding-dimension bookkeeping for one project.
pub struct SchemaManager {
    db_path: PathBuf,
    index_path: PathBuf,
}

impl SchemaManager {
    /// Compute the on-disk database path for a project's schema id under `data_dir`.
    pub fn db_path_for(data_dir: &Path, schema_id: &str) -> PathBuf {
        data_dir.join(format!("{schema_id}.db"))
    }

    /// Compute the on-disk HNSW index path for a project's schema id under `data_dir`.
    pub fn index_path_for(data_dir: &Path, schema_id: &str) -> PathBuf {
        data_dir.join(format!("{schema_id}.usearch"))
    }

    pub fn new(data_dir: &Path, schema_id: &str) -> Self {
        Self {
            db_path: Self::db_path_for(data_dir, schema_id),
            index_path: Self::index_path_for(data_dir, schema_id),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Create the schema (tables/indexes) if missing and run any pending migrations.
    pub async fn ensure_schema(&self, pool: &ConnectionPool) -> StorageResult<()> {
        pool.with_conn(|conn| apply_migrations(conn).map(|_| ())).await
    }

    /// The embedding dimension currently recorded for this project, if any row has ever
    /// been persisted.
    pub async fn recorded_dimension(&self, pool: &ConnectionPool, project_path: String) -> StorageResult<Option<usize>> {
        pool.with_conn(move |conn| {
            conn.query_row(
                "SELECT embedding_dim FROM schema_meta WHERE project_path = ?1",
                params![project_path],
                |row| row.get::<_, Option<i64>>(0),
            )
            .map(|v| v.map(|d| d as usize))
            .or(Ok(None))
        })
        .await
    }

    /// Persist a newly learned embedding dimension for this project.
    pub async fn record_dimension(
        &self,
        pool: &ConnectionPool,
        project_path: String,
        dim: usize,
        model: Option<String>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        pool.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO schema_meta (project_path, embedding_dim, embedding_model, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(project_path) DO UPDATE SET
                    embedding_dim = excluded.embedding_dim,
                    embedding_model = excluded.embedding_model,
                    updated_at = excluded.updated_at",
                params![project_path, dim as i64, model, now],
            )
            .map(|_| ())
        })
        .await
    }

    /// Export every memory's id/content/tags/metadata before a dimension-change rebuild
    /// discards embeddings. Collaborators that need to preserve the rows elsewhere should
    /// call this before `rebuild_for_dimension`.
    pub async fn export_memories_before_migration(
        &self,
        pool: &ConnectionPool,
        project_path: String,
    ) -> StorageResult<Vec<ExportedMemory>> {
        pool.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, content, tags, metadata FROM memories WHERE project_path = ?1",
            )?;
            let rows = stmt.query_map(params![project_path], |row| {
                Ok(ExportedMemory {
                    id: row.get(0)?,
                    content: row.get(1)?,
                    tags: row.get(2)?,
                    metadata: row.get(3)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }

    /// Drop dependent objects, discard all memory rows (their embeddings are now in a
    /// different, incompatible vector space), and record the new dimension. SQLite has no
    /// `TRUNCATE` or `ALTER COLUMN TYPE`, so "truncate the embedding column, rebuild the
    /// index" becomes "delete the rows, delete the index file, let callers re-insert".
    pub async fn rebuild_for_dimension(
        &self,
        pool: &ConnectionPool,
        project_path: String,
        new_dim: usize,
        model: Option<String>,
    ) -> StorageResult<()> {
        tracing::warn!(
            project = %project_path,
            new_dim,
            "embedding dimension changed — rebuilding memories and HNSW index"
        );

        let project_path_for_delete = project_path.clone();
        pool.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM memories WHERE project_path = ?1",
                params![project_path_for_delete],
            )
            .map(|_| ())
        })
        .await?;

        if self.index_path.exists() {
            std::fs::remove_file(&self.index_path).map_err(StorageError::from)?;
        }

        self.record_dimension(pool, project_path, new_dim, model).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn test_pool() -> (tempfile::TempDir, ConnectionPool, SchemaManager) {
        let dir = tempdir().unwrap();
        let mgr = SchemaManager::new(dir.path(), "mem_test");
        let pool = ConnectionPool::open(mgr.db_path(), 4, Duration::from_secs(30)).unwrap();
        mgr.ensure_schema(&pool).await.unwrap();
        (dir, pool, mgr)
    }

    #[tokio::test]
    async fn records_and_reads_back_dimension() {
        let (_dir, pool, mgr) = test_pool().await;
        assert_eq!(mgr.recorded_dimension(&pool, "/p".into()).await.unwrap(), None);
        mgr.record_dimension(&pool, "/p".into(), 768, Some("test-model".into()))
            .await
            .unwrap();
        assert_eq!(
            mgr.recorded_dimension(&pool, "/p".into()).await.unwrap(),
            Some(768)
        );
    }

    #[tokio::test]
    async fn rebuild_clears_memories_for_project() {
        let (_dir, pool, mgr) = test_pool().await;
        pool.with_conn(|conn| {
            conn.execute(
                "INSERT INTO memories (id, content, project_path, content_hash, created_at, updated_at)
                 VALUES ('a', 'hello', '/p', 'h1', datetime('now'), datetime('now'))",
                [],
            )
        })
        .await
        .unwrap();

        mgr.rebuild_for_dimension(&pool, "/p".into(), 768, None)
            .await
            .unwrap();

        let count: i64 = pool
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0)))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}

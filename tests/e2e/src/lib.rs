//! Shared harness for the end-to-end test suite: wires up a throwaway project's full storage
//! and search stack the way `memoria-mcp`'s `main.rs` does, minus the stdio server itself.

use std::path::PathBuf;
use std::time::Duration;

use memoria_core::{
    ConnectionPool, DrilldownRegistry, EmbeddingClient, EmbeddingQueue, HotPathManager,
    MemoryInput, ProjectContext, SchemaManager, SearchEngine,
};
use tempfile::TempDir;

/// A fully wired project stack backed by a temporary directory. The directory (and its
/// database file) is deleted when this value drops.
pub struct TestHarness {
    pub project: ProjectContext,
    pub pool: ConnectionPool,
    pub schema: SchemaManager,
    pub embedder: EmbeddingClient,
    pub queue: EmbeddingQueue,
    pub search: SearchEngine,
    pub drilldowns: DrilldownRegistry,
    pub hotpaths: HotPathManager,
    _dir: TempDir,
}

impl TestHarness {
    /// Build a harness whose embedder points at a socket that nothing is listening on —
    /// every `embed` call fails transient, exercising the queue-overflow path.
    pub async fn new(dimensions: usize) -> Self {
        Self::with_socket(dimensions, None).await
    }

    /// Build a harness whose embedder points at a caller-supplied socket path (e.g. a mock
    /// embedding provider bound by the test itself).
    pub async fn with_socket(dimensions: usize, socket_path: Option<PathBuf>) -> Self {
        let dir = TempDir::new().expect("create temp project dir");
        let project = ProjectContext::resolve(Some(dir.path().to_path_buf()))
            .expect("resolve project context");

        let data_dir = dir.path().join(".memoria");
        let schema = SchemaManager::new(&data_dir, project.project_schema());
        let pool = ConnectionPool::open(schema.db_path(), 5, Duration::from_secs(30))
            .expect("open connection pool");
        schema.ensure_schema(&pool).await.expect("apply migrations");

        let socket_path = socket_path.unwrap_or_else(|| data_dir.join("embeddings.sock"));
        let embedder = EmbeddingClient::new(
            socket_path,
            Duration::from_millis(50),
            Duration::from_secs(2),
            Duration::from_millis(100),
        );
        let queue = EmbeddingQueue::new(project.project_schema());
        let search = SearchEngine::new(dimensions).expect("build vector index");
        let drilldowns = DrilldownRegistry::new();
        let hotpaths = HotPathManager::new();

        Self {
            project,
            pool,
            schema,
            embedder,
            queue,
            search,
            drilldowns,
            hotpaths,
            _dir: dir,
        }
    }

    pub fn project_path_string(&self) -> String {
        self.project.project_path().to_string_lossy().to_string()
    }

    /// Build a `MemoryInput` carrying an explicit embedding, so a test can exercise storage
    /// and search without a live embedding provider.
    pub fn input_with_embedding(&self, content: &str, embedding: Vec<f32>) -> MemoryInput {
        let mut input = MemoryInput::new(content, self.project_path_string());
        input.embedding = Some(embedding);
        input
    }

    /// A deterministic unit-length embedding derived from `seed`, distinct enough for
    /// similarity-ordering assertions without needing a real model.
    pub fn fake_embedding(dimensions: usize, seed: u64) -> Vec<f32> {
        let mut vector: Vec<f32> = (0..dimensions)
            .map(|i| ((seed.wrapping_mul(2654435761).wrapping_add(i as u64)) % 1000) as f32 / 1000.0)
            .collect();
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

//! AppState — the set of memoria-core components one running server instance owns.
//!
//! One `AppState` per process, scoped to the single project resolved at startup. Tool and
//! resource handlers borrow it rather than reaching for a global, per the "no bare statics"
//! rule that also shapes `DrilldownRegistry`.

use std::sync::Mutex;

use memoria_core::{
    Config, ConnectionPool, DrilldownRegistry, EmbeddingClient, EmbeddingQueue, HotPathManager,
    ProjectContext, SchemaManager, SearchEngine,
};

pub struct AppState {
    pub config: Config,
    pub project: ProjectContext,
    pub pool: ConnectionPool,
    pub schema: SchemaManager,
    pub embedder: EmbeddingClient,
    pub queue: EmbeddingQueue,
    pub search: SearchEngine,
    pub drilldowns: DrilldownRegistry,
    pub hotpaths: HotPathManager,
    /// Learned lazily: `None` until the first embedding has been produced or loaded from
    /// `schema_meta`. Tool handlers read this through `schema_dimension()` rather than the
    /// field directly so every call sees the same snapshot-then-release pattern.
    schema_dimension: Mutex<Option<usize>>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        project: ProjectContext,
        pool: ConnectionPool,
        schema: SchemaManager,
        embedder: EmbeddingClient,
        queue: EmbeddingQueue,
        search: SearchEngine,
        drilldowns: DrilldownRegistry,
        hotpaths: HotPathManager,
        recorded_dimension: Option<usize>,
    ) -> Self {
        Self {
            config,
            project,
            pool,
            schema,
            embedder,
            queue,
            search,
            drilldowns,
            hotpaths,
            schema_dimension: Mutex::new(recorded_dimension),
        }
    }

    pub fn project_path_string(&self) -> String {
        self.project.project_path().to_string_lossy().to_string()
    }

    pub fn schema_dimension(&self) -> Option<usize> {
        *self.schema_dimension.lock().unwrap()
    }

    /// Record the project's embedding dimension the first time it becomes known, both in
    /// memory and in `schema_meta`. A no-op once a dimension has already been recorded.
    pub async fn remember_dimension(&self, dim: usize) -> memoria_core::Result<()> {
        if self.schema_dimension().is_some() {
            return Ok(());
        }
        self.schema
            .record_dimension(&self.pool, self.project_path_string(), dim, None)
            .await
            .map_err(memoria_core::MemoriaError::Storage)?;
        *self.schema_dimension.lock().unwrap() = Some(dim);
        Ok(())
    }
}

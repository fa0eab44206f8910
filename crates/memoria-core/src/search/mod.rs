//! Search: HNSW vector search, FTS5 keyword fallback, and the orchestrating SearchEngine.

mod engine;
mod keyword;
mod vector;

pub use engine::{row_to_memory, SearchEngine, SearchOptions, SearchResult};
pub use keyword::{sanitize_fts5_query, KeywordHit, KeywordSearcher};
pub use vector::{
    VectorIndex, VectorIndexConfig, VectorIndexStats, VectorSearchError, DEFAULT_CONNECTIVITY,
    DEFAULT_DIMENSIONS,
};

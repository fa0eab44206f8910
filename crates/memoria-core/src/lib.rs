//! # Memoria Core
//!
//! Per-project, long-running memory engine for LLM coding assistants: project-isolated SQLite
//! storage, a socket-backed embedding pipeline with durable overflow, HNSW vector search fused
//! with FTS5 keyword fallback, sleep-inspired consolidation, context-restoration recovery, and
//! hot-path access prediction.
//!
//! ## Modules
//!
//! - [`project`] — resolves a filesystem path to a stable, isolated project identity
//! - [`storage`] — pooled SQLite connections, versioned migrations, schema bookkeeping
//! - [`memory`] — the `Memory` entity and its CRUD store
//! - [`embeddings`] — the embedding client (Unix socket IPC) and its durable overflow queue
//! - [`search`] — HNSW vector search, FTS5 keyword fallback, and the orchestrating engine
//! - [`drilldown`] — ephemeral numeric ids issued against camera-roll search results
//! - [`consolidation`] — clusters and merges related memories
//! - [`restoration`] — recovers individual turns from "summary of prior conversation" memories
//! - [`hotpath`] — observes access order and predicts what a caller will need next
//! - [`codebase`] — indexes source files into searchable definitions
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): statically link SQLite via `rusqlite`'s `bundled` feature
//! - `vector-search` (default): HNSW vector search via `usearch`

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod codebase;
pub mod config;
pub mod consolidation;
pub mod embeddings;
pub mod error;
pub mod hotpath;
pub mod memory;
pub mod project;
pub mod restoration;
pub mod storage;

#[cfg(feature = "vector-search")]
#[cfg_attr(docsrs, doc(cfg(feature = "vector-search")))]
pub mod search;

pub mod drilldown;

pub use codebase::{CodebaseIndexer, IndexReport};
pub use config::Config;
pub use consolidation::{
    Cluster, ConsolidationEngine, ConsolidationOptions, ConsolidationReport, ConsolidationStrategy,
};
pub use drilldown::{DrilldownRegistry, DrilldownStats};
pub use embeddings::{
    average_and_normalize, cosine_similarity, dot_product, euclidean_distance, EmbeddingClient,
    EmbeddingQueue, Embedding,
};
pub use error::{MemoriaError, Result, StorageError, StorageResult};
pub use hotpath::HotPathManager;
pub use memory::{
    content_hash, AccessTransition, CodeDefinition, DrilldownEntry, DrilldownKind,
    EmbeddingQueueItem, HotPath, Importance, Memory, MemoryInput, MemoryStore, MemoryType,
    QueueStatus,
};
pub use project::ProjectContext;
pub use restoration::{ContextRestorationParser, RestorationReport};

#[cfg(feature = "vector-search")]
pub use search::{
    row_to_memory, sanitize_fts5_query, KeywordHit, KeywordSearcher, SearchEngine, SearchOptions,
    SearchResult, VectorIndex, VectorIndexConfig, VectorIndexStats, VectorSearchError,
    DEFAULT_CONNECTIVITY, DEFAULT_DIMENSIONS,
};

pub use storage::{
    configure_connection, ConnectionPool, ExportedMemory, SchemaManager, HNSW_CONNECTIVITY,
    HNSW_EXPANSION_ADD, HNSW_EXPANSION_SEARCH,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

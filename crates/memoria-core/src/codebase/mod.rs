//! Codebase indexing: scans a project tree, extracts per-language definitions, and persists
//! them with embeddings into `code_definitions`.

mod indexer;

pub use indexer::{CodebaseIndexer, IndexReport};

//! Storage Module
//!
//! Per-project SQLite storage: pooled connections, versioned migrations, and schema/
//! embedding-dimension bookkeeping.

mod migrations;
mod pool;
mod schema;

pub use migrations::{Migration, MIGRATIONS};
pub use pool::{configure_connection, ConnectionPool};
pub use schema::{
    ExportedMemory, SchemaManager, HNSW_CONNECTIVITY, HNSW_EXPANSION_ADD, HNSW_EXPANSION_SEARCH,
};

//! Tool handlers: one module per MCP tool, each exposing `schema()` and `execute()`.

pub mod consolidate_memory;
pub mod delete_memory;
pub mod drill_down;
pub mod get_memory;
pub mod get_stats;
pub mod link_memories;
pub mod recall_memory;
pub mod search_memory;
pub mod store_memory;
pub mod update_memory;

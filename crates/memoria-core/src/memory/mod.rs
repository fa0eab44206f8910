//! Core entity types shared by storage, search, consolidation, and the tool surface.

mod store;
mod types;

pub use store::{content_hash, MemoryStore};
pub use types::{
    AccessTransition, CodeDefinition, DrilldownEntry, DrilldownKind, EmbeddingQueueItem,
    HotPath, Importance, Memory, MemoryInput, MemoryType, QueueStatus,
};

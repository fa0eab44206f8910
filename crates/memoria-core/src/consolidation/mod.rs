//! Consolidation: clusters related memories and merges each cluster into one consolidated
//! memory, transactionally.

mod engine;

pub use engine::{
    Cluster, ConsolidationEngine, ConsolidationOptions, ConsolidationReport, ConsolidationStrategy,
};

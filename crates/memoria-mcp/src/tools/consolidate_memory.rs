//! consolidate_memory — cluster related memories and merge each cluster into one.

use serde_json::{json, Value};

use memoria_core::{ConsolidationEngine, ConsolidationOptions, ConsolidationStrategy};

use crate::state::AppState;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "strategy": {
                "type": "string",
                "enum": ["similarity", "temporal", "tagBased", "importance"],
                "description": "Defaults to similarity"
            },
            "dryRun": {"type": "boolean"},
            "similarityThreshold": {"type": "number"},
            "minClusterSize": {"type": "integer"}
        }
    })
}

pub async fn execute(state: &AppState, arguments: Option<Value>) -> Result<Value, String> {
    let args = arguments.unwrap_or_else(|| json!({}));
    let mut options = ConsolidationOptions {
        similarity_threshold: state.config.consolidation_similarity_threshold,
        min_cluster_size: state.config.consolidation_min_memories,
        ..ConsolidationOptions::default()
    };

    if let Some(s) = args.get("strategy").and_then(|v| v.as_str()) {
        options.strategy = match s {
            "temporal" => ConsolidationStrategy::Temporal,
            "tagBased" => ConsolidationStrategy::TagBased,
            "importance" => ConsolidationStrategy::Importance,
            _ => ConsolidationStrategy::Similarity,
        };
    }
    if let Some(d) = args.get("dryRun").and_then(|v| v.as_bool()) {
        options.dry_run = d;
    }
    if let Some(t) = args.get("similarityThreshold").and_then(|v| v.as_f64()) {
        options.similarity_threshold = t as f32;
    }
    if let Some(m) = args.get("minClusterSize").and_then(|v| v.as_u64()) {
        options.min_cluster_size = m as usize;
    }

    let project_path = state.project_path_string();
    let report = ConsolidationEngine::run(&state.pool, &state.search, project_path, options)
        .await
        .map_err(|e| e.to_string())?;

    Ok(json!({
        "clustersFound": report.clusters_found,
        "memoriesMerged": report.memories_merged,
        "newMemoryIds": report.new_memory_ids,
        "dryRun": report.dry_run,
    }))
}

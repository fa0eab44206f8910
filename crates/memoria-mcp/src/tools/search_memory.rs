//! search_memory — hybrid vector/keyword search over the current project's memories.

use serde_json::{json, Value};

use memoria_core::{MemoryType, SearchOptions};

use crate::state::AppState;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {"type": "string"},
            "limit": {"type": "integer", "description": "Defaults to the configured search limit"},
            "threshold": {"type": "number", "description": "Overrides the adaptive similarity threshold"},
            "memoryType": {"type": "string", "enum": ["semantic", "episodic", "procedural", "working", "consolidated"]},
            "tags": {"type": "array", "items": {"type": "string"}},
            "recencyBoost": {"type": "boolean", "description": "Defaults to true"},
            "keywordFallback": {"type": "boolean", "description": "Defaults to true"},
            "cameraRoll": {"type": "boolean", "description": "Issue drilldown ids for results"}
        },
        "required": ["query"]
    })
}

pub async fn execute(state: &AppState, arguments: Option<Value>) -> Result<Value, String> {
    let args = arguments.ok_or("missing arguments")?;
    let query = args.get("query").and_then(|v| v.as_str()).ok_or("query is required")?;

    let mut options = SearchOptions {
        limit: args
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(state.config.search_limit),
        threshold: args
            .get("threshold")
            .and_then(|v| v.as_f64())
            .map(|f| f as f32)
            .or(state.config.search_threshold),
        recency_boost: args.get("recencyBoost").and_then(|v| v.as_bool()).unwrap_or(true),
        keyword_fallback: args.get("keywordFallback").and_then(|v| v.as_bool()).unwrap_or(true),
        camera_roll: args.get("cameraRoll").and_then(|v| v.as_bool()).unwrap_or(false),
        ..Default::default()
    };
    if let Some(t) = args.get("memoryType").and_then(|v| v.as_str()) {
        options.memory_type = Some(MemoryType::parse_name(t));
    }
    if let Some(tags) = args.get("tags").and_then(|v| v.as_array()) {
        options.tags = tags.iter().filter_map(|t| t.as_str().map(String::from)).collect();
    }

    let project_path = state.project_path_string();
    let results = state
        .search
        .search(&state.pool, &state.embedder, Some(&state.drilldowns), &project_path, query, options)
        .await
        .map_err(|e| e.to_string())?;

    let items: Vec<Value> = results
        .iter()
        .map(|r| {
            json!({
                "id": r.memory.id,
                "content": r.memory.content,
                "similarity": r.similarity,
                "isFallback": r.is_fallback,
                "drilldownId": r.drilldown_id,
                "tags": r.memory.tags,
                "importance": r.memory.importance.as_str(),
                "memoryType": r.memory.memory_type.as_str(),
            })
        })
        .collect();

    Ok(json!({"results": items, "count": items.len()}))
}

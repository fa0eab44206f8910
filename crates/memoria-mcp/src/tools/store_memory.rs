//! store_memory — insert a new memory, deduping on `(project_path, content_hash)`.

use serde_json::{json, Value};

use memoria_core::{Importance, MemoryInput, MemoryStore, MemoryType};

use crate::state::AppState;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "content": {"type": "string", "description": "Memory content to store"},
            "memoryType": {
                "type": "string",
                "enum": ["semantic", "episodic", "procedural", "working"],
                "description": "Defaults to semantic"
            },
            "importance": {
                "type": "string",
                "enum": ["trivial", "low", "medium", "high", "critical"],
                "description": "Defaults to medium"
            },
            "tags": {"type": "array", "items": {"type": "string"}},
            "metadata": {"type": "object"}
        },
        "required": ["content"]
    })
}

pub async fn execute(state: &AppState, arguments: Option<Value>) -> Result<Value, String> {
    let args = arguments.ok_or("missing arguments")?;
    let content = args
        .get("content")
        .and_then(|v| v.as_str())
        .ok_or("content is required")?;

    let mut input = MemoryInput::new(content, state.project_path_string());
    if let Some(t) = args.get("memoryType").and_then(|v| v.as_str()) {
        input.memory_type = MemoryType::parse_name(t);
    }
    if let Some(i) = args.get("importance").and_then(|v| v.as_str()) {
        input.importance = Importance::parse_name(i);
    }
    if let Some(tags) = args.get("tags").and_then(|v| v.as_array()) {
        input.tags = tags.iter().filter_map(|t| t.as_str().map(String::from)).collect();
    }
    if let Some(metadata) = args.get("metadata") {
        input.metadata = metadata.clone();
    }

    let schema_dim = state.schema_dimension();
    let (id, inserted) = MemoryStore::insert(
        &state.pool,
        &state.embedder,
        &state.queue,
        &state.search,
        schema_dim,
        input,
    )
    .await
    .map_err(|e| e.to_string())?;

    if inserted && schema_dim.is_none() {
        if let Some(dim) = state.embedder.dimension() {
            state.remember_dimension(dim).await.map_err(|e| e.to_string())?;
        }
    }

    Ok(json!({"id": id, "inserted": inserted}))
}

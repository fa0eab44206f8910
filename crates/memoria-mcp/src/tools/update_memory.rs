//! update_memory — partial patch; content changes regenerate the embedding, nothing else does.

use serde_json::{json, Value};

use memoria_core::{Importance, MemoryStore};

use crate::state::AppState;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": {"type": "string"},
            "content": {"type": "string"},
            "importance": {"type": "string", "enum": ["trivial", "low", "medium", "high", "critical"]},
            "tags": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["id"]
    })
}

pub async fn execute(state: &AppState, arguments: Option<Value>) -> Result<Value, String> {
    let args = arguments.ok_or("missing arguments")?;
    let id = args.get("id").and_then(|v| v.as_str()).ok_or("id is required")?.to_string();
    let project_path = state.project_path_string();

    let new_content = args.get("content").and_then(|v| v.as_str()).map(String::from);
    let new_importance = args.get("importance").and_then(|v| v.as_str()).map(Importance::parse_name);
    let new_tags = args
        .get("tags")
        .and_then(|v| v.as_array())
        .map(|tags| tags.iter().filter_map(|t| t.as_str().map(String::from)).collect());

    let updated = MemoryStore::update(
        &state.pool,
        &state.embedder,
        &state.search,
        project_path,
        id.clone(),
        new_content,
        new_importance,
        new_tags,
    )
    .await
    .map_err(|e| e.to_string())?;

    Ok(json!({"id": id, "updated": updated}))
}

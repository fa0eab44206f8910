//! delete_memory — remove a memory, cascading to its access transitions and vector index entry.

use serde_json::{json, Value};

use memoria_core::MemoryStore;

use crate::state::AppState;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": {"type": "string"}
        },
        "required": ["id"]
    })
}

pub async fn execute(state: &AppState, arguments: Option<Value>) -> Result<Value, String> {
    let args = arguments.ok_or("missing arguments")?;
    let id = args.get("id").and_then(|v| v.as_str()).ok_or("id is required")?.to_string();
    let project_path = state.project_path_string();

    let deleted = MemoryStore::delete(&state.pool, &state.search, project_path, id.clone())
        .await
        .map_err(|e| e.to_string())?;

    Ok(json!({"id": id, "deleted": deleted}))
}

//! recall_memory — fetch a memory by id, recording the access for decay and hot-path tracking.

use serde_json::{json, Value};

use memoria_core::MemoryStore;

use crate::state::AppState;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": {"type": "string"},
            "sessionId": {
                "type": "string",
                "description": "Groups this access with prior ones for hot-path promotion"
            }
        },
        "required": ["id"]
    })
}

pub async fn execute(state: &AppState, arguments: Option<Value>) -> Result<Value, String> {
    let args = arguments.ok_or("missing arguments")?;
    let id = args.get("id").and_then(|v| v.as_str()).ok_or("id is required")?;
    let project_path = state.project_path_string();

    let memory = MemoryStore::get(&state.pool, project_path.clone(), id.to_string())
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("memory not found: {id}"))?;

    MemoryStore::record_access(&state.pool, id.to_string())
        .await
        .map_err(|e| e.to_string())?;

    if let Some(session_id) = args.get("sessionId").and_then(|v| v.as_str()) {
        state
            .hotpaths
            .record_access(&state.pool, &project_path, session_id, id)
            .await
            .map_err(|e| e.to_string())?;
    }

    Ok(json!({
        "id": memory.id,
        "content": memory.content,
        "memoryType": memory.memory_type.as_str(),
        "importance": memory.importance.as_str(),
        "tags": memory.tags,
        "metadata": memory.metadata,
        "relatedMemories": memory.related_memories,
        "createdAt": memory.created_at.to_rfc3339(),
        "accessCount": memory.access_count + 1,
    }))
}

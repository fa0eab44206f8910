//! get_memory — read a memory by id without side effects (no access count bump, no hot-path
//! tracking); use `recall_memory` when the access itself should be remembered.

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
    let id = args.get("id").and_then(|v| v.as_str()).ok_or("id is required")?;
    let project_path = state.project_path_string();

    let memory = MemoryStore::get(&state.pool, project_path, id.to_string())
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("memory not found: {id}"))?;

    Ok(json!({
        "id": memory.id,
        "content": memory.content,
        "memoryType": memory.memory_type.as_str(),
        "importance": memory.importance.as_str(),
        "tags": memory.tags,
        "metadata": memory.metadata,
        "relatedMemories": memory.related_memories,
        "consolidatedFrom": memory.consolidated_from,
        "createdAt": memory.created_at.to_rfc3339(),
        "updatedAt": memory.updated_at.to_rfc3339(),
        "accessCount": memory.access_count,
        "lastAccessedAt": memory.last_accessed_at.map(|t| t.to_rfc3339()),
        "expiresAt": memory.expires_at.map(|t| t.to_rfc3339()),
    }))
}

//! drill_down — resolve an ephemeral camera-roll id back to the memory it refers to.

use serde_json::{json, Value};

use memoria_core::{DrilldownKind, MemoryStore};

use crate::state::AppState;

const MAX_RELATED: usize = 5;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "drilldownId": {"type": "integer"}
        },
        "required": ["drilldownId"]
    })
}

pub async fn execute(state: &AppState, arguments: Option<Value>) -> Result<Value, String> {
    let args = arguments.ok_or("missing arguments")?;
    let drilldown_id = args
        .get("drilldownId")
        .and_then(|v| v.as_u64())
        .ok_or("drilldownId is required")?;

    let entry = state
        .drilldowns
        .resolve(drilldown_id)
        .ok_or("drilldown id not found or expired")?;

    let project_path = state.project_path_string();
    let memory = MemoryStore::get(&state.pool, project_path.clone(), entry.memory_id.clone())
        .await
        .map_err(|e| e.to_string())?
        .ok_or("referenced memory no longer exists")?;

    let mut related = Vec::with_capacity(MAX_RELATED.min(memory.related_memories.len()));
    for related_id in memory.related_memories.iter().take(MAX_RELATED) {
        let Some(related_memory) =
            MemoryStore::get(&state.pool, project_path.clone(), related_id.clone())
                .await
                .map_err(|e| e.to_string())?
        else {
            continue;
        };
        let related_drilldown_id = state
            .drilldowns
            .register(related_memory.id.clone(), DrilldownKind::Memory);
        related.push(json!({
            "drilldownId": related_drilldown_id,
            "id": related_memory.id,
            "content": related_memory.content,
            "tags": related_memory.tags,
            "importance": related_memory.importance.as_str(),
        }));
    }

    Ok(json!({
        "kind": entry.kind.as_str(),
        "id": memory.id,
        "content": memory.content,
        "tags": memory.tags,
        "importance": memory.importance.as_str(),
        "related": related,
    }))
}

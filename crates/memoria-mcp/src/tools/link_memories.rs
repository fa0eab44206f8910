//! link_memories — record a bidirectional association in both memories' `related_memories`.

use rusqlite::params;
use serde_json::{json, Value};

use memoria_core::ConnectionPool;

use crate::state::AppState;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "fromId": {"type": "string"},
            "toId": {"type": "string"}
        },
        "required": ["fromId", "toId"]
    })
}

pub async fn execute(state: &AppState, arguments: Option<Value>) -> Result<Value, String> {
    let args = arguments.ok_or("missing arguments")?;
    let from_id = args.get("fromId").and_then(|v| v.as_str()).ok_or("fromId is required")?.to_string();
    let to_id = args.get("toId").and_then(|v| v.as_str()).ok_or("toId is required")?.to_string();
    let project_path = state.project_path_string();

    add_related(&state.pool, &project_path, &from_id, &to_id).await?;
    add_related(&state.pool, &project_path, &to_id, &from_id).await?;

    Ok(json!({"fromId": from_id, "toId": to_id, "linked": true}))
}

async fn add_related(pool: &ConnectionPool, project_path: &str, id: &str, related_id: &str) -> Result<(), String> {
    let project_path = project_path.to_string();
    let id = id.to_string();
    let related_id = related_id.to_string();
    pool.with_conn(move |conn| {
        let existing: String = conn.query_row(
            "SELECT related_memories FROM memories WHERE id = ?1 AND project_path = ?2",
            params![id, project_path],
            |row| row.get(0),
        )?;
        let mut related: Vec<String> = serde_json::from_str(&existing).unwrap_or_default();
        if !related.iter().any(|r| r == &related_id) {
            related.push(related_id);
        }
        let related_json = serde_json::to_string(&related).unwrap_or_else(|_| "[]".to_string());
        conn.execute(
            "UPDATE memories SET related_memories = ?1 WHERE id = ?2 AND project_path = ?3",
            params![related_json, id, project_path],
        )?;
        Ok(())
    })
    .await
    .map_err(|e| e.to_string())
}

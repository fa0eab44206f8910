//! MCP resources: read-only URI-addressed views into the current project's memory store.

use rusqlite::params;
use serde_json::json;

use crate::state::AppState;

pub async fn read(state: &AppState, uri: &str) -> Result<String, String> {
    match uri {
        "memory://stats" => read_stats(state).await,
        "memory://recent" => read_recent(state).await,
        _ => Err(format!("unknown resource: {uri}")),
    }
}

async fn read_stats(state: &AppState) -> Result<String, String> {
    let value = crate::tools::get_stats::execute(state, None)
        .await
        .map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&value).map_err(|e| e.to_string())
}

async fn read_recent(state: &AppState) -> Result<String, String> {
    let project_path = state.project_path_string();
    let rows = state
        .pool
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, content, memory_type, importance, created_at \
                 FROM memories WHERE project_path = ?1 ORDER BY created_at DESC LIMIT 10",
            )?;
            let rows = stmt
                .query_map(params![project_path], |row| {
                    Ok(json!({
                        "id": row.get::<_, String>(0)?,
                        "content": row.get::<_, String>(1)?,
                        "memoryType": row.get::<_, String>(2)?,
                        "importance": row.get::<_, String>(3)?,
                        "createdAt": row.get::<_, String>(4)?,
                    }))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
        .map_err(|e| e.to_string())?;

    serde_json::to_string_pretty(&json!({"memories": rows})).map_err(|e| e.to_string())
}

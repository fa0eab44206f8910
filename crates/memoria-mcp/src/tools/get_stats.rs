//! get_stats — memory counts and health signals for the current project.

use rusqlite::params;
use serde_json::{json, Value};

use crate::state::AppState;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {}
    })
}

struct Counts {
    total: i64,
    with_embeddings: i64,
    queue_pending: i64,
    hot_paths: i64,
}

pub async fn execute(state: &AppState, _arguments: Option<Value>) -> Result<Value, String> {
    let project_path = state.project_path_string();
    let pp = project_path.clone();

    let counts = state
        .pool
        .with_conn(move |conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM memories WHERE project_path = ?1",
                params![pp],
                |row| row.get(0),
            )?;
            let with_embeddings: i64 = conn.query_row(
                "SELECT COUNT(*) FROM memories WHERE project_path = ?1 AND embedding IS NOT NULL",
                params![pp],
                |row| row.get(0),
            )?;
            let queue_pending: i64 = conn.query_row(
                "SELECT COUNT(*) FROM embedding_queue WHERE project_id = ?1 AND status = 'pending'",
                params![pp],
                |row| row.get(0),
            )?;
            let hot_paths: i64 = conn.query_row(
                "SELECT COUNT(*) FROM hot_paths WHERE project_path = ?1",
                params![pp],
                |row| row.get(0),
            )?;
            Ok(Counts { total, with_embeddings, queue_pending, hot_paths })
        })
        .await
        .map_err(|e| e.to_string())?;

    let embedding_coverage = if counts.total > 0 {
        counts.with_embeddings as f64 / counts.total as f64 * 100.0
    } else {
        0.0
    };

    Ok(json!({
        "projectPath": project_path,
        "totalMemories": counts.total,
        "memoriesWithEmbeddings": counts.with_embeddings,
        "embeddingCoveragePercent": embedding_coverage,
        "embeddingQueuePending": counts.queue_pending,
        "hotPathCount": counts.hot_paths,
        "embeddingDimension": state.schema_dimension(),
    }))
}

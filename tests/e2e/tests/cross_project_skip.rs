//! A summary whose declared source project is unrelated to the current project is skipped by
//! the restoration parser: no memories are extracted and the skip counter advances.

use memoria_core::{ContextRestorationParser, MemoryStore};
use memoria_e2e_tests::TestHarness;

#[tokio::test]
async fn foreign_project_summary_is_skipped() {
    let harness = TestHarness::new(8).await;

    let mut input = harness.input_with_embedding(
        "Summary of prior conversation\nUser: do the thing\nAssistant: done",
        TestHarness::fake_embedding(8, 1),
    );
    input.metadata = serde_json::json!({ "sourceProjectPath": "/completely/unrelated/project" });

    let (id, _) = MemoryStore::insert(
        &harness.pool,
        &harness.embedder,
        &harness.queue,
        &harness.search,
        Some(8),
        input,
    )
    .await
    .unwrap();

    let candidate = MemoryStore::get(&harness.pool, harness.project_path_string(), id)
        .await
        .unwrap()
        .expect("candidate row exists");

    let report = ContextRestorationParser::process(
        &harness.pool,
        &harness.embedder,
        &harness.queue,
        &harness.search,
        Some(8),
        &harness.project,
        vec![candidate],
    )
    .await
    .unwrap();

    assert_eq!(report.summaries_detected, 1);
    assert_eq!(report.summaries_skipped_foreign_project, 1);
    assert_eq!(report.turns_inserted, 0);

    let count: i64 = harness
        .pool
        .with_conn({
            let project_path = harness.project_path_string();
            move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM memories WHERE project_path = ?1",
                    rusqlite::params![project_path],
                    |row| row.get(0),
                )
            }
        })
        .await
        .unwrap();
    // Only the original summary memory, none of its extracted turns.
    assert_eq!(count, 1);
}

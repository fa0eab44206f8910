//! Inserting the same `(role, content, project)` twice yields exactly one persisted row, and
//! the second call reports `inserted = false`.

use memoria_core::{content_hash, MemoryStore};
use memoria_e2e_tests::TestHarness;

#[tokio::test]
async fn second_insert_of_identical_content_is_a_noop() {
    let harness = TestHarness::new(8).await;
    let embedding = TestHarness::fake_embedding(8, 1);

    let mut first = harness.input_with_embedding("  hello world  ", embedding.clone());
    first.role = Some("user".to_string());
    let (first_id, first_inserted) = MemoryStore::insert(
        &harness.pool,
        &harness.embedder,
        &harness.queue,
        &harness.search,
        Some(8),
        first,
    )
    .await
    .unwrap();
    assert!(first_inserted);

    let mut second = harness.input_with_embedding("  hello world  ", embedding);
    second.role = Some("user".to_string());
    let (second_id, second_inserted) = MemoryStore::insert(
        &harness.pool,
        &harness.embedder,
        &harness.queue,
        &harness.search,
        Some(8),
        second,
    )
    .await
    .unwrap();

    assert!(!second_inserted);
    assert_eq!(first_id, second_id);

    let stored = MemoryStore::get(&harness.pool, harness.project_path_string(), first_id)
        .await
        .unwrap()
        .expect("row exists");
    assert_eq!(
        stored.content_hash,
        content_hash(Some("user"), "  hello world  ", &harness.project_path_string())
    );

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
    assert_eq!(count, 1);
}

//! With the embedding provider unreachable, a search fails `EmbeddingUnavailable` rather than
//! silently degrading; an `enqueue`d insert's future resolves once `drain` later embeds it.

use memoria_core::{MemoriaError, MemoryInput, MemoryStore, SearchOptions};
use memoria_e2e_tests::TestHarness;

#[tokio::test]
async fn search_fails_while_unreachable_then_queue_drains() {
    let harness = TestHarness::new(8).await;

    let err = harness
        .search
        .search(
            &harness.pool,
            &harness.embedder,
            Some(&harness.drilldowns),
            &harness.project_path_string(),
            "hi",
            SearchOptions { limit: 5, ..Default::default() },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MemoriaError::EmbeddingUnavailable(_)));

    // No embedding supplied and the provider is unreachable: insert falls through to the
    // durable queue instead of failing outright.
    let input = MemoryInput::new("queued memory", harness.project_path_string());
    let (id, inserted) = MemoryStore::insert(
        &harness.pool,
        &harness.embedder,
        &harness.queue,
        &harness.search,
        None,
        input,
    )
    .await
    .unwrap();
    assert!(inserted);

    let stored = MemoryStore::get(&harness.pool, harness.project_path_string(), id.clone())
        .await
        .unwrap()
        .unwrap();
    assert!(stored.embedding.is_none(), "embedding is pending, not yet computed");

    let pending: i64 = harness
        .pool
        .with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM embedding_queue WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )
        })
        .await
        .unwrap();
    assert_eq!(pending, 1);

    // A directly enqueued request's future must resolve once drain embeds its row, independent
    // of whatever MemoryStore::insert queued above.
    let receiver = harness
        .queue
        .enqueue(&harness.pool, "direct enqueue".to_string(), 0)
        .await
        .unwrap();

    // The provider is reachable again: drain with a stand-in embed function that plays its role.
    let processed = harness
        .queue
        .drain(&harness.pool, 10, |text| async move {
            Ok(memoria_core::Embedding::new(TestHarness::fake_embedding(8, text.len() as u64)))
        })
        .await
        .unwrap();
    assert_eq!(processed, 2);

    let resolved = tokio::time::timeout(std::time::Duration::from_secs(5), receiver)
        .await
        .expect("future resolves within 5 seconds")
        .expect("oneshot sender not dropped")
        .expect("embed succeeded");
    assert_eq!(resolved.vector.len(), 8);

    let completed: i64 = harness
        .pool
        .with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM embedding_queue WHERE status = 'completed'",
                [],
                |row| row.get(0),
            )
        })
        .await
        .unwrap();
    assert_eq!(completed, 2);
}

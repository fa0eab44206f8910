//! A project whose recorded embedding dimension disagrees with the provider's actual dimension
//! gets its memories and HNSW index rebuilt; inserts afterward are validated against the new
//! dimension.

use memoria_core::{MemoriaError, MemoryStore, SearchEngine};
use memoria_e2e_tests::TestHarness;

#[tokio::test]
async fn dimension_mismatch_triggers_rebuild() {
    let harness = TestHarness::new(384).await;
    let project_path = harness.project_path_string();

    harness
        .schema
        .record_dimension(&harness.pool, project_path.clone(), 384, Some("old-model".into()))
        .await
        .unwrap();

    let stale = harness.input_with_embedding("stale memory", vec![0.0; 384]);
    MemoryStore::insert(
        &harness.pool,
        &harness.embedder,
        &harness.queue,
        &harness.search,
        Some(384),
        stale,
    )
    .await
    .unwrap();

    // The provider now reports 768 dimensions; SchemaManager drops the old rows and index and
    // records the new dimension, exactly as main.rs's startup sequence would on disagreement.
    harness
        .schema
        .rebuild_for_dimension(&harness.pool, project_path.clone(), 768, Some("new-model".into()))
        .await
        .unwrap();

    let remaining: i64 = harness
        .pool
        .with_conn({
            let project_path = project_path.clone();
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
    assert_eq!(remaining, 0, "rebuild must discard the incompatible-dimension rows");

    assert_eq!(
        harness
            .schema
            .recorded_dimension(&harness.pool, project_path.clone())
            .await
            .unwrap(),
        Some(768)
    );

    // The in-memory HNSW index was built for the old 384-dim space; a real rebuild would also
    // reconstruct it (see SchemaManager::rebuild_for_dimension's doc comment). Stand up a fresh
    // one here to match the newly recorded dimension.
    let search_768 = SearchEngine::new(768).unwrap();

    let fresh = harness.input_with_embedding("fresh memory", vec![0.1; 768]);
    let (_, inserted) = MemoryStore::insert(
        &harness.pool,
        &harness.embedder,
        &harness.queue,
        &search_768,
        Some(768),
        fresh,
    )
    .await
    .unwrap();
    assert!(inserted);

    let mismatched = harness.input_with_embedding("wrong dimension memory", vec![0.1; 384]);
    let err = MemoryStore::insert(
        &harness.pool,
        &harness.embedder,
        &harness.queue,
        &search_768,
        Some(768),
        mismatched,
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        MemoriaError::SchemaMismatch { expected: 768, actual: 384 }
    ));
}

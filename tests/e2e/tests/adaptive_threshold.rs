//! The similarity threshold bands up as a project's embedded corpus grows.

use memoria_core::{MemoryStore, SearchEngine};
use memoria_e2e_tests::TestHarness;

#[tokio::test]
async fn threshold_bands_with_corpus_size() {
    let harness = TestHarness::new(8).await;

    let (threshold, corpus_size) = harness
        .search
        .threshold_diagnostics(&harness.pool, &harness.project_path_string())
        .await
        .unwrap();
    assert_eq!(corpus_size, 0);
    assert_eq!(threshold, 0.10);

    for i in 0..200 {
        let input = harness.input_with_embedding(
            &format!("memory number {i}"),
            TestHarness::fake_embedding(8, i as u64),
        );
        MemoryStore::insert(
            &harness.pool,
            &harness.embedder,
            &harness.queue,
            &harness.search,
            Some(8),
            input,
        )
        .await
        .unwrap();
    }

    // A fresh engine instance avoids the 5-minute threshold cache masking the new corpus size.
    let fresh_search = SearchEngine::new(8).unwrap();
    let (threshold, corpus_size) = fresh_search
        .threshold_diagnostics(&harness.pool, &harness.project_path_string())
        .await
        .unwrap();
    assert_eq!(corpus_size, 200);
    assert_eq!(threshold, 0.30);
}

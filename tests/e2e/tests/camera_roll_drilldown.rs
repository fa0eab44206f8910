//! Camera-roll mode attaches a drilldown id to each search result; resolving one returns the
//! full memory plus up to 5 related memories, each with its own fresh, distinct drilldown id.

use memoria_core::{DrilldownKind, MemoryStore, SearchOptions};
use memoria_e2e_tests::TestHarness;

#[tokio::test]
async fn drilldown_ids_are_fresh_and_distinct() {
    let harness = TestHarness::new(8).await;
    let query_vector = TestHarness::fake_embedding(8, 42);

    let mut input = harness.input_with_embedding("authentication flow notes", query_vector.clone());
    input.tags = vec!["auth".to_string()];
    let (primary_id, _) = MemoryStore::insert(
        &harness.pool,
        &harness.embedder,
        &harness.queue,
        &harness.search,
        Some(8),
        input,
    )
    .await
    .unwrap();

    let mut related_ids = Vec::new();
    for i in 0..3 {
        let related_input = harness.input_with_embedding(
            &format!("auth related note {i}"),
            TestHarness::fake_embedding(8, 42 + i),
        );
        let (id, _) = MemoryStore::insert(
            &harness.pool,
            &harness.embedder,
            &harness.queue,
            &harness.search,
            Some(8),
            related_input,
        )
        .await
        .unwrap();
        related_ids.push(id);
    }

    let mut primary = MemoryStore::get(&harness.pool, harness.project_path_string(), primary_id.clone())
        .await
        .unwrap()
        .unwrap();
    primary.related_memories = related_ids.clone();

    let results = harness
        .search
        .search(
            &harness.pool,
            &harness.embedder,
            Some(&harness.drilldowns),
            &harness.project_path_string(),
            "auth",
            SearchOptions {
                limit: 10,
                threshold: Some(-1.0),
                camera_roll: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(!results.is_empty());
    let drilldown_ids: Vec<u64> = results.iter().map(|r| r.drilldown_id.expect("camera roll issues an id")).collect();
    let unique: std::collections::HashSet<_> = drilldown_ids.iter().collect();
    assert_eq!(unique.len(), drilldown_ids.len(), "every result gets a distinct id");

    let primary_result = results.iter().find(|r| r.memory.id == primary_id).expect("primary memory found");
    let entry = harness.drilldowns.resolve(primary_result.drilldown_id.unwrap()).unwrap();
    assert_eq!(entry.memory_id, primary_id);
    assert_eq!(entry.kind, DrilldownKind::Memory);

    // Resolving the primary memory's own related set, capped at 5, each gets its own id.
    let capped: Vec<&String> = primary.related_memories.iter().take(5).collect();
    let related_drilldown_ids: Vec<u64> = capped
        .iter()
        .map(|id| harness.drilldowns.register((*id).clone(), DrilldownKind::Memory))
        .collect();
    let unique_related: std::collections::HashSet<_> = related_drilldown_ids.iter().collect();
    assert_eq!(unique_related.len(), related_drilldown_ids.len());
    assert!(related_drilldown_ids.len() <= 5);
}

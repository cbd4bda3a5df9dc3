//! Cross-namespace aggregation integration tests.

mod common;

use common::setup_test_state;

#[tokio::test]
async fn test_search_all_groups_by_namespace() {
    let (state, _, _) = setup_test_state().await;

    state
        .memory
        .store("sky over the bay", "user:alice")
        .await
        .unwrap();
    state
        .memory
        .store("sky camera module", "project:x")
        .await
        .unwrap();
    state
        .memory
        .store("unrelated grocery list", "user:bob")
        .await
        .unwrap();

    let groups = state.aggregator.search_all("sky").await.unwrap();

    // Two namespaces matched; user:bob had no matches and is omitted
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].namespace, "user:alice");
    assert_eq!(groups[1].namespace, "project:x");
    assert_eq!(groups[0].memories.len(), 1);
    assert_eq!(groups[1].memories.len(), 1);
}

#[tokio::test]
async fn test_search_all_orders_by_first_seen_namespace() {
    let (state, _, _) = setup_test_state().await;

    // Interleaved stores; grouping must follow first-seen order, not
    // alphabetical or recency order
    state.memory.store("sky one", "user:zed").await.unwrap();
    state.memory.store("sky two", "project:aaa").await.unwrap();
    state.memory.store("sky three", "user:zed").await.unwrap();

    let groups = state.aggregator.search_all("sky").await.unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].namespace, "user:zed");
    assert_eq!(groups[1].namespace, "project:aaa");
    assert_eq!(groups[0].memories.len(), 2);
}

#[tokio::test]
async fn test_search_all_empty_store() {
    let (state, _, _) = setup_test_state().await;

    let groups = state.aggregator.search_all("anything").await.unwrap();
    assert!(groups.is_empty());
}

#[tokio::test]
async fn test_search_all_caps_fanout() {
    let (state, _, _) = setup_test_state().await;

    // 60 namespaces, every one holding a matching memory; only the first
    // 50 in enumeration order may be searched
    for i in 0..60 {
        state
            .memory
            .store("alpha signal", &format!("user:u{:02}", i))
            .await
            .unwrap();
    }

    let groups = state.aggregator.search_all("alpha").await.unwrap();
    assert_eq!(groups.len(), 50);
    assert_eq!(groups[0].namespace, "user:u00");
    assert_eq!(groups[49].namespace, "user:u49");
    assert!(!groups.iter().any(|g| g.namespace == "user:u50"));
}

#[tokio::test]
async fn test_search_all_degrades_on_index_failure() {
    let (state, index, _) = setup_test_state().await;

    state
        .memory
        .store("sky over the bay", "user:alice")
        .await
        .unwrap();

    // A failing index degrades each namespace search to empty, so the
    // aggregate is empty rather than an error
    index.fail_queries(true);
    let groups = state.aggregator.search_all("sky").await.unwrap();
    assert!(groups.is_empty());
}

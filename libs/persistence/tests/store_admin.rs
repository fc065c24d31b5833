//! Store lifecycle, durability across reopen, and bulk deletion.


use harness::{enter, store, unique_instance_id};
use procflow_persistence::{FlowNodeInstanceStore, StoreConfig, StoreError};
use procflow_types::FlowNodeInstanceState;
use serde_json::json;

#[tokio::test]
async fn operations_before_initialize_fail() {
    let store = FlowNodeInstanceStore::new(StoreConfig::in_memory());
    let err = store.query_by_correlation("corr-1").await.unwrap_err();
    assert!(matches!(err, StoreError::NotInitialized));

    let err = store
        .persist_on_exit("Task_1", "fni-1", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotInitialized));
}

#[tokio::test]
async fn initialize_twice_is_a_no_op() {
    let store = store().await;
    let id = unique_instance_id();
    enter(&store, "Task_1", &id, "corr-1", "model-1", "pi-1", json!({})).await;

    // A second initialize reuses the open connection; existing rows survive.
    store.initialize().await.unwrap();
    let instance = store.query_by_instance_id(&id).await.unwrap();
    assert_eq!(instance.state, FlowNodeInstanceState::Running);
}

#[tokio::test]
async fn dispose_closes_the_connection() {
    let store = store().await;
    store.health_check().await.unwrap();

    store.dispose().await.unwrap();
    assert!(matches!(
        store.health_check().await,
        Err(StoreError::NotInitialized)
    ));
    assert!(matches!(
        store.query_active().await,
        Err(StoreError::NotInitialized)
    ));
}

#[tokio::test]
async fn state_survives_reopening_a_file_backed_store() {
    let dir = tempfile::tempdir().unwrap();
    let database_url = format!(
        "sqlite://{}",
        dir.path().join("procflow.db").to_str().unwrap()
    );
    let config = StoreConfig {
        database_url,
        ..StoreConfig::default()
    };

    let store = FlowNodeInstanceStore::new(config.clone());
    store.initialize().await.unwrap();
    enter(&store, "Task_1", "fni-1", "corr-1", "model-1", "pi-1", json!({"x": 1})).await;
    store.suspend("Task_1", "fni-1", &json!({"x": 2})).await.unwrap();
    store.dispose().await.unwrap();

    let reopened = FlowNodeInstanceStore::new(config);
    reopened.initialize().await.unwrap();
    let instance = reopened.query_by_instance_id("fni-1").await.unwrap();
    assert_eq!(instance.state, FlowNodeInstanceState::Suspended);
    assert_eq!(instance.tokens.len(), 2);
    reopened.dispose().await.unwrap();
}

#[tokio::test]
async fn delete_by_process_model_removes_only_that_model() {
    let store = store().await;

    enter(&store, "Task_1", "fni-a", "corr-1", "model-doomed", "pi-1", json!({})).await;
    store.suspend("Task_1", "fni-a", &json!({})).await.unwrap();
    enter(&store, "Task_2", "fni-b", "corr-1", "model-doomed", "pi-1", json!({})).await;
    enter(&store, "Task_1", "fni-c", "corr-1", "model-kept", "pi-2", json!({})).await;
    store.persist_on_exit("Task_1", "fni-c", &json!({})).await.unwrap();

    store.delete_by_process_model_id("model-doomed").await.unwrap();

    assert!(store.query_by_process_model("model-doomed").await.unwrap().is_empty());
    assert!(matches!(
        store.query_by_instance_id("fni-a").await,
        Err(StoreError::NotFound(_))
    ));
    // Tokens of the deleted instances are gone with them.
    assert!(store
        .query_process_tokens_by_process_instance("pi-1")
        .await
        .unwrap()
        .is_empty());

    // The other model is untouched, history included.
    let kept = store.query_by_instance_id("fni-c").await.unwrap();
    assert_eq!(kept.state, FlowNodeInstanceState::Finished);
    assert_eq!(kept.tokens.len(), 2);
}

#[tokio::test]
async fn delete_of_an_unknown_model_is_a_no_op() {
    let store = store().await;
    enter(&store, "Task_1", "fni-a", "corr-1", "model-1", "pi-1", json!({})).await;

    store.delete_by_process_model_id("no-such-model").await.unwrap();
    assert_eq!(store.query_by_process_model("model-1").await.unwrap().len(), 1);
}

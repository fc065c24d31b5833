//! Walk one flow node instance through its lifecycle against an in-memory
//! store and print the resulting token history.
//!
//! Run with: `cargo run -p procflow-persistence --example lifecycle`

use procflow_persistence::{FlowNodeInstanceStore, StoreConfig};
use procflow_types::{FlowNodeDefinition, ProcessContext};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let store = FlowNodeInstanceStore::new(StoreConfig::in_memory());
    store.initialize().await?;

    let definition = FlowNodeDefinition::new("Approve_Invoice", "bpmn:UserTask");
    let context = ProcessContext {
        correlation_id: "corr-42".to_string(),
        process_model_id: "invoice_approval".to_string(),
        process_instance_id: "pi-1".to_string(),
        parent_process_instance_id: None,
        owner_identity: json!({"user": "alice"}),
    };

    let instance = store
        .persist_on_enter(
            &definition,
            "fni-1",
            &context,
            &json!({"invoice": "INV-1009", "amount": 1250}),
            None,
        )
        .await?;
    println!("created: state={}", instance.state);

    // The task waits for user input, then completes.
    store
        .suspend(&definition.id, "fni-1", &json!({"waiting_on": "alice"}))
        .await?;
    store
        .resume(&definition.id, "fni-1", &json!({"approved": true}))
        .await?;
    let finished = store
        .persist_on_exit(&definition.id, "fni-1", &json!({"approved": true, "by": "alice"}))
        .await?;

    println!("finished: state={}", finished.state);
    for token in &finished.tokens {
        println!(
            "  {} {} {}",
            token.created_at.to_rfc3339(),
            token.token_type,
            token.payload
        );
    }

    let active = store.query_active().await?;
    println!("active instances remaining: {}", active.len());

    store.dispose().await?;
    Ok(())
}

//! Read-only lookups over instances and their tokens.
//!
//! Every lookup returns instances hydrated with their full token history,
//! so callers never need a second round trip. List queries order by
//! creation time descending (most recent first); token history within an
//! instance is always ascending. No caching: every call reflects the
//! current durable state.

use procflow_types::{FlowNodeInstance, FlowNodeInstanceState, ProcessToken};
use sqlx::sqlite::SqlitePool;

use crate::error::{StoreError, StoreResult};
use crate::rows::InstanceRow;
use crate::token_ledger;

/// Attach token histories to a fetched set of instance rows, preserving
/// the row order.
async fn hydrate(pool: &SqlitePool, rows: Vec<InstanceRow>) -> StoreResult<Vec<FlowNodeInstance>> {
    let ids: Vec<String> = rows.iter().map(|row| row.instance_id.clone()).collect();
    let mut tokens = token_ledger::for_instances(pool, &ids).await?;

    rows.into_iter()
        .map(|row| {
            let history = tokens.remove(&row.instance_id).unwrap_or_default();
            row.into_record(history)
        })
        .collect()
}

/// Load one instance by its id.
pub(crate) async fn by_instance_id(
    pool: &SqlitePool,
    instance_id: &str,
) -> StoreResult<FlowNodeInstance> {
    let row = sqlx::query_as::<_, InstanceRow>(
        r#"
        SELECT instance_id, flow_node_id, flow_node_type, event_type,
               correlation_id, process_model_id, process_instance_id,
               parent_process_instance_id, owner_identity, state, error,
               previous_instance_id, created_at, updated_at
        FROM flow_node_instances
        WHERE instance_id = $1
        "#,
    )
    .bind(instance_id)
    .fetch_optional(pool)
    .await
    .map_err(StoreError::Query)?;

    let Some(row) = row else {
        return Err(StoreError::NotFound(format!(
            "flow node instance {instance_id}"
        )));
    };

    let tokens = token_ledger::history(pool, instance_id).await?;
    row.into_record(tokens)
}

/// Load the most recent instance of one flow node within a correlation and
/// process model.
pub(crate) async fn specific_flow_node(
    pool: &SqlitePool,
    correlation_id: &str,
    process_model_id: &str,
    flow_node_id: &str,
) -> StoreResult<FlowNodeInstance> {
    let row = sqlx::query_as::<_, InstanceRow>(
        r#"
        SELECT instance_id, flow_node_id, flow_node_type, event_type,
               correlation_id, process_model_id, process_instance_id,
               parent_process_instance_id, owner_identity, state, error,
               previous_instance_id, created_at, updated_at
        FROM flow_node_instances
        WHERE correlation_id = $1 AND process_model_id = $2 AND flow_node_id = $3
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(correlation_id)
    .bind(process_model_id)
    .bind(flow_node_id)
    .fetch_optional(pool)
    .await
    .map_err(StoreError::Query)?;

    let Some(row) = row else {
        return Err(StoreError::NotFound(format!(
            "instance of flow node {flow_node_id} in correlation {correlation_id} and process model {process_model_id}"
        )));
    };

    let tokens = token_ledger::history(pool, &row.instance_id).await?;
    row.into_record(tokens)
}

/// Query all instances of one flow node definition.
pub(crate) async fn by_flow_node_id(
    pool: &SqlitePool,
    flow_node_id: &str,
) -> StoreResult<Vec<FlowNodeInstance>> {
    let rows = sqlx::query_as::<_, InstanceRow>(
        r#"
        SELECT instance_id, flow_node_id, flow_node_type, event_type,
               correlation_id, process_model_id, process_instance_id,
               parent_process_instance_id, owner_identity, state, error,
               previous_instance_id, created_at, updated_at
        FROM flow_node_instances
        WHERE flow_node_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(flow_node_id)
    .fetch_all(pool)
    .await
    .map_err(StoreError::Query)?;

    hydrate(pool, rows).await
}

/// Query all instances in a correlation.
pub(crate) async fn by_correlation(
    pool: &SqlitePool,
    correlation_id: &str,
) -> StoreResult<Vec<FlowNodeInstance>> {
    let rows = sqlx::query_as::<_, InstanceRow>(
        r#"
        SELECT instance_id, flow_node_id, flow_node_type, event_type,
               correlation_id, process_model_id, process_instance_id,
               parent_process_instance_id, owner_identity, state, error,
               previous_instance_id, created_at, updated_at
        FROM flow_node_instances
        WHERE correlation_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(correlation_id)
    .fetch_all(pool)
    .await
    .map_err(StoreError::Query)?;

    hydrate(pool, rows).await
}

/// Query all instances of a process model.
pub(crate) async fn by_process_model(
    pool: &SqlitePool,
    process_model_id: &str,
) -> StoreResult<Vec<FlowNodeInstance>> {
    let rows = sqlx::query_as::<_, InstanceRow>(
        r#"
        SELECT instance_id, flow_node_id, flow_node_type, event_type,
               correlation_id, process_model_id, process_instance_id,
               parent_process_instance_id, owner_identity, state, error,
               previous_instance_id, created_at, updated_at
        FROM flow_node_instances
        WHERE process_model_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(process_model_id)
    .fetch_all(pool)
    .await
    .map_err(StoreError::Query)?;

    hydrate(pool, rows).await
}

/// Query all instances of a process model within a correlation.
pub(crate) async fn by_correlation_and_process_model(
    pool: &SqlitePool,
    correlation_id: &str,
    process_model_id: &str,
) -> StoreResult<Vec<FlowNodeInstance>> {
    let rows = sqlx::query_as::<_, InstanceRow>(
        r#"
        SELECT instance_id, flow_node_id, flow_node_type, event_type,
               correlation_id, process_model_id, process_instance_id,
               parent_process_instance_id, owner_identity, state, error,
               previous_instance_id, created_at, updated_at
        FROM flow_node_instances
        WHERE correlation_id = $1 AND process_model_id = $2
        ORDER BY created_at DESC
        "#,
    )
    .bind(correlation_id)
    .bind(process_model_id)
    .fetch_all(pool)
    .await
    .map_err(StoreError::Query)?;

    hydrate(pool, rows).await
}

/// Query all instances in an explicit state.
pub(crate) async fn by_state(
    pool: &SqlitePool,
    state: FlowNodeInstanceState,
) -> StoreResult<Vec<FlowNodeInstance>> {
    let rows = sqlx::query_as::<_, InstanceRow>(
        r#"
        SELECT instance_id, flow_node_id, flow_node_type, event_type,
               correlation_id, process_model_id, process_instance_id,
               parent_process_instance_id, owner_identity, state, error,
               previous_instance_id, created_at, updated_at
        FROM flow_node_instances
        WHERE state = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(state.as_str())
    .fetch_all(pool)
    .await
    .map_err(StoreError::Query)?;

    hydrate(pool, rows).await
}

/// Query all running or suspended instances.
pub(crate) async fn active(pool: &SqlitePool) -> StoreResult<Vec<FlowNodeInstance>> {
    let rows = sqlx::query_as::<_, InstanceRow>(
        r#"
        SELECT instance_id, flow_node_id, flow_node_type, event_type,
               correlation_id, process_model_id, process_instance_id,
               parent_process_instance_id, owner_identity, state, error,
               previous_instance_id, created_at, updated_at
        FROM flow_node_instances
        WHERE state IN ($1, $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(FlowNodeInstanceState::Running.as_str())
    .bind(FlowNodeInstanceState::Suspended.as_str())
    .fetch_all(pool)
    .await
    .map_err(StoreError::Query)?;

    hydrate(pool, rows).await
}

/// Query all running or suspended instances of one process instance.
pub(crate) async fn active_by_process_instance(
    pool: &SqlitePool,
    process_instance_id: &str,
) -> StoreResult<Vec<FlowNodeInstance>> {
    let rows = sqlx::query_as::<_, InstanceRow>(
        r#"
        SELECT instance_id, flow_node_id, flow_node_type, event_type,
               correlation_id, process_model_id, process_instance_id,
               parent_process_instance_id, owner_identity, state, error,
               previous_instance_id, created_at, updated_at
        FROM flow_node_instances
        WHERE process_instance_id = $1 AND state IN ($2, $3)
        ORDER BY created_at DESC
        "#,
    )
    .bind(process_instance_id)
    .bind(FlowNodeInstanceState::Running.as_str())
    .bind(FlowNodeInstanceState::Suspended.as_str())
    .fetch_all(pool)
    .await
    .map_err(StoreError::Query)?;

    hydrate(pool, rows).await
}

/// Query all running or suspended instances of a process model within a
/// correlation.
pub(crate) async fn active_by_correlation_and_process_model(
    pool: &SqlitePool,
    correlation_id: &str,
    process_model_id: &str,
) -> StoreResult<Vec<FlowNodeInstance>> {
    let rows = sqlx::query_as::<_, InstanceRow>(
        r#"
        SELECT instance_id, flow_node_id, flow_node_type, event_type,
               correlation_id, process_model_id, process_instance_id,
               parent_process_instance_id, owner_identity, state, error,
               previous_instance_id, created_at, updated_at
        FROM flow_node_instances
        WHERE correlation_id = $1 AND process_model_id = $2 AND state IN ($3, $4)
        ORDER BY created_at DESC
        "#,
    )
    .bind(correlation_id)
    .bind(process_model_id)
    .bind(FlowNodeInstanceState::Running.as_str())
    .bind(FlowNodeInstanceState::Suspended.as_str())
    .fetch_all(pool)
    .await
    .map_err(StoreError::Query)?;

    hydrate(pool, rows).await
}

/// Query all suspended instances in a correlation.
pub(crate) async fn suspended_by_correlation(
    pool: &SqlitePool,
    correlation_id: &str,
) -> StoreResult<Vec<FlowNodeInstance>> {
    let rows = sqlx::query_as::<_, InstanceRow>(
        r#"
        SELECT instance_id, flow_node_id, flow_node_type, event_type,
               correlation_id, process_model_id, process_instance_id,
               parent_process_instance_id, owner_identity, state, error,
               previous_instance_id, created_at, updated_at
        FROM flow_node_instances
        WHERE correlation_id = $1 AND state = $2
        ORDER BY created_at DESC
        "#,
    )
    .bind(correlation_id)
    .bind(FlowNodeInstanceState::Suspended.as_str())
    .fetch_all(pool)
    .await
    .map_err(StoreError::Query)?;

    hydrate(pool, rows).await
}

/// Query all suspended instances of a process model.
pub(crate) async fn suspended_by_process_model(
    pool: &SqlitePool,
    process_model_id: &str,
) -> StoreResult<Vec<FlowNodeInstance>> {
    let rows = sqlx::query_as::<_, InstanceRow>(
        r#"
        SELECT instance_id, flow_node_id, flow_node_type, event_type,
               correlation_id, process_model_id, process_instance_id,
               parent_process_instance_id, owner_identity, state, error,
               previous_instance_id, created_at, updated_at
        FROM flow_node_instances
        WHERE process_model_id = $1 AND state = $2
        ORDER BY created_at DESC
        "#,
    )
    .bind(process_model_id)
    .bind(FlowNodeInstanceState::Suspended.as_str())
    .fetch_all(pool)
    .await
    .map_err(StoreError::Query)?;

    hydrate(pool, rows).await
}

/// Flatten the token histories of every instance in one process instance.
/// Instances are visited most recent first, each history in ascending
/// creation order.
pub(crate) async fn tokens_by_process_instance(
    pool: &SqlitePool,
    process_instance_id: &str,
) -> StoreResult<Vec<ProcessToken>> {
    let rows = sqlx::query_as::<_, InstanceRow>(
        r#"
        SELECT instance_id, flow_node_id, flow_node_type, event_type,
               correlation_id, process_model_id, process_instance_id,
               parent_process_instance_id, owner_identity, state, error,
               previous_instance_id, created_at, updated_at
        FROM flow_node_instances
        WHERE process_instance_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(process_instance_id)
    .fetch_all(pool)
    .await
    .map_err(StoreError::Query)?;

    let instances = hydrate(pool, rows).await?;
    Ok(instances
        .into_iter()
        .flat_map(|instance| instance.tokens)
        .collect())
}

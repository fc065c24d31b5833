//! The flow node instance store.
//!
//! The store owns the instance state machine. Every transition call updates
//! the instance row and appends exactly one process token in the same
//! transaction; any failure rolls both writes back, so no partial state is
//! ever observable. After a committed write the instance is re-read and
//! returned hydrated with its full token history.
//!
//! Concurrent transitions against the same instance are not serialized
//! here: every call's token is retained, and the final state is whichever
//! write commits last.

use chrono::Utc;
use procflow_types::{
    document, FlowNodeDefinition, FlowNodeInstance, FlowNodeInstanceState, InstanceFailure,
    ProcessContext, ProcessToken, ProcessTokenType,
};
use serde_json::Value;
use sqlx::Row;
use tracing::{debug, error, instrument};

use crate::config::StoreConfig;
use crate::db::{ensure_schema, ConnectionProvider};
use crate::error::{StoreError, StoreResult};
use crate::query;
use crate::token_ledger;

/// State-machine-aware persistence for flow node instances.
#[derive(Clone)]
pub struct FlowNodeInstanceStore {
    provider: ConnectionProvider,
}

impl FlowNodeInstanceStore {
    /// Create a store for the given configuration. No connection is opened
    /// until [`initialize`](Self::initialize) is called.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            provider: ConnectionProvider::new(config),
        }
    }

    /// Create a store on an existing connection provider.
    pub fn with_provider(provider: ConnectionProvider) -> Self {
        Self { provider }
    }

    /// Open the connection and ensure both relations exist. A second call
    /// reuses the open connection and is a no-op.
    pub async fn initialize(&self) -> StoreResult<()> {
        let pool = self.provider.connect().await?;
        ensure_schema(&pool).await?;
        debug!("flow node instance store initialized");
        Ok(())
    }

    /// Close the connection and clear internal handles.
    pub async fn dispose(&self) -> StoreResult<()> {
        self.provider.disconnect().await
    }

    /// Check if the underlying database is reachable.
    pub async fn health_check(&self) -> StoreResult<()> {
        self.provider.health_check().await
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Create an instance in the `Running` state together with its
    /// `OnEnter` token.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if an instance with this id already
    /// exists.
    #[instrument(skip(self, definition, context, payload), fields(flow_node_id = %definition.id))]
    pub async fn persist_on_enter(
        &self,
        definition: &FlowNodeDefinition,
        instance_id: &str,
        context: &ProcessContext,
        payload: &Value,
        previous_instance_id: Option<&str>,
    ) -> StoreResult<FlowNodeInstance> {
        let pool = self.provider.current().await?;
        let now = Utc::now();

        let result = async {
            let mut tx = pool.begin().await.map_err(StoreError::Query)?;

            sqlx::query(
                r#"
                INSERT INTO flow_node_instances (
                    instance_id, flow_node_id, flow_node_type, event_type,
                    correlation_id, process_model_id, process_instance_id,
                    parent_process_instance_id, owner_identity, state,
                    previous_instance_id, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(instance_id)
            .bind(&definition.id)
            .bind(&definition.flow_node_type)
            .bind(&definition.event_type)
            .bind(&context.correlation_id)
            .bind(&context.process_model_id)
            .bind(&context.process_instance_id)
            .bind(&context.parent_process_instance_id)
            .bind(document::encode(&context.owner_identity))
            .bind(FlowNodeInstanceState::Running.as_str())
            .bind(previous_instance_id)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e {
                    if db_err.is_unique_violation() {
                        return StoreError::Conflict {
                            instance_id: instance_id.to_string(),
                        };
                    }
                }
                StoreError::Query(e)
            })?;

            token_ledger::append_within(&mut tx, instance_id, ProcessTokenType::OnEnter, payload, now)
                .await?;

            tx.commit().await.map_err(StoreError::Query)
        }
        .await;

        if let Err(err) = result {
            if !matches!(err, StoreError::Conflict { .. }) {
                error!(
                    flow_node_id = %definition.id,
                    instance_id,
                    target_state = %FlowNodeInstanceState::Running,
                    error = %err,
                    "instance creation failed, transaction rolled back"
                );
            }
            return Err(err);
        }

        debug!(instance_id, "flow node instance created");
        query::by_instance_id(&pool, instance_id).await
    }

    /// Transition an instance to `Finished`, appending an `OnExit` token.
    #[instrument(skip(self, payload))]
    pub async fn persist_on_exit(
        &self,
        flow_node_id: &str,
        instance_id: &str,
        payload: &Value,
    ) -> StoreResult<FlowNodeInstance> {
        self.persist_on_state_change(
            flow_node_id,
            instance_id,
            FlowNodeInstanceState::Finished,
            ProcessTokenType::OnExit,
            payload,
            None,
        )
        .await
    }

    /// Transition an instance to `Error`, appending an `OnExit` token and
    /// recording the failure on the instance.
    #[instrument(skip(self, payload, failure))]
    pub async fn persist_on_error(
        &self,
        flow_node_id: &str,
        instance_id: &str,
        payload: &Value,
        failure: &InstanceFailure,
    ) -> StoreResult<FlowNodeInstance> {
        self.persist_on_state_change(
            flow_node_id,
            instance_id,
            FlowNodeInstanceState::Error,
            ProcessTokenType::OnExit,
            payload,
            Some(failure),
        )
        .await
    }

    /// Transition an instance to `Terminated`, appending an `OnExit` token.
    #[instrument(skip(self, payload))]
    pub async fn persist_on_terminate(
        &self,
        flow_node_id: &str,
        instance_id: &str,
        payload: &Value,
    ) -> StoreResult<FlowNodeInstance> {
        self.persist_on_state_change(
            flow_node_id,
            instance_id,
            FlowNodeInstanceState::Terminated,
            ProcessTokenType::OnExit,
            payload,
            None,
        )
        .await
    }

    /// Suspend an instance, appending an `OnSuspend` token.
    ///
    /// Not idempotency-guarded: suspending an already suspended instance is
    /// accepted and appends another token. Recovery logic relies on this.
    #[instrument(skip(self, payload))]
    pub async fn suspend(
        &self,
        flow_node_id: &str,
        instance_id: &str,
        payload: &Value,
    ) -> StoreResult<FlowNodeInstance> {
        self.persist_on_state_change(
            flow_node_id,
            instance_id,
            FlowNodeInstanceState::Suspended,
            ProcessTokenType::OnSuspend,
            payload,
            None,
        )
        .await
    }

    /// Resume an instance, appending an `OnResume` token.
    #[instrument(skip(self, payload))]
    pub async fn resume(
        &self,
        flow_node_id: &str,
        instance_id: &str,
        payload: &Value,
    ) -> StoreResult<FlowNodeInstance> {
        self.persist_on_state_change(
            flow_node_id,
            instance_id,
            FlowNodeInstanceState::Running,
            ProcessTokenType::OnResume,
            payload,
            None,
        )
        .await
    }

    /// Shared transition path: locate the instance by flow node id and
    /// instance id, validate the current state, update state (and error),
    /// append the token, commit, re-read.
    async fn persist_on_state_change(
        &self,
        flow_node_id: &str,
        instance_id: &str,
        target: FlowNodeInstanceState,
        token_type: ProcessTokenType,
        payload: &Value,
        failure: Option<&InstanceFailure>,
    ) -> StoreResult<FlowNodeInstance> {
        let pool = self.provider.current().await?;
        let now = Utc::now();

        let result = async {
            let mut tx = pool.begin().await.map_err(StoreError::Query)?;

            // Matching on both columns rejects transitions addressed to an
            // existing instance through a stale flow node reference.
            let row = sqlx::query(
                r#"
                SELECT state FROM flow_node_instances
                WHERE flow_node_id = $1 AND instance_id = $2
                "#,
            )
            .bind(flow_node_id)
            .bind(instance_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::Query)?;

            let Some(row) = row else {
                return Err(StoreError::NotFound(format!(
                    "flow node instance {instance_id} of flow node {flow_node_id}"
                )));
            };

            let stored: String = row.try_get("state").map_err(StoreError::Query)?;
            let current = FlowNodeInstanceState::from_str(&stored)
                .ok_or_else(|| StoreError::Invalid(format!("unknown instance state: {stored}")))?;
            if current.is_terminal() {
                return Err(StoreError::IllegalTransition {
                    instance_id: instance_id.to_string(),
                    from: current,
                    to: target,
                });
            }

            sqlx::query(
                r#"
                UPDATE flow_node_instances
                SET state = $1, error = COALESCE($2, error), updated_at = $3
                WHERE flow_node_id = $4 AND instance_id = $5
                "#,
            )
            .bind(target.as_str())
            .bind(failure.map(InstanceFailure::encode))
            .bind(now)
            .bind(flow_node_id)
            .bind(instance_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Query)?;

            token_ledger::append_within(&mut tx, instance_id, token_type, payload, now).await?;

            tx.commit().await.map_err(StoreError::Query)
        }
        .await;

        if let Err(err) = result {
            if !matches!(
                err,
                StoreError::NotFound(_) | StoreError::IllegalTransition { .. }
            ) {
                error!(
                    flow_node_id,
                    instance_id,
                    target_state = %target,
                    error = %err,
                    "state transition failed, transaction rolled back"
                );
            }
            return Err(err);
        }

        debug!(instance_id, state = %target, token_type = %token_type, "flow node instance transitioned");
        query::by_instance_id(&pool, instance_id).await
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Load one instance by its id, with its full ordered token history.
    pub async fn query_by_instance_id(&self, instance_id: &str) -> StoreResult<FlowNodeInstance> {
        let pool = self.provider.current().await?;
        query::by_instance_id(&pool, instance_id).await
    }

    /// Load the most recent instance of one flow node within a correlation
    /// and process model.
    pub async fn query_specific_flow_node(
        &self,
        correlation_id: &str,
        process_model_id: &str,
        flow_node_id: &str,
    ) -> StoreResult<FlowNodeInstance> {
        let pool = self.provider.current().await?;
        query::specific_flow_node(&pool, correlation_id, process_model_id, flow_node_id).await
    }

    /// All instances of one flow node definition, most recent first.
    pub async fn query_by_flow_node_id(
        &self,
        flow_node_id: &str,
    ) -> StoreResult<Vec<FlowNodeInstance>> {
        let pool = self.provider.current().await?;
        query::by_flow_node_id(&pool, flow_node_id).await
    }

    /// All instances in a correlation, most recent first.
    pub async fn query_by_correlation(
        &self,
        correlation_id: &str,
    ) -> StoreResult<Vec<FlowNodeInstance>> {
        let pool = self.provider.current().await?;
        query::by_correlation(&pool, correlation_id).await
    }

    /// All instances of a process model, most recent first.
    pub async fn query_by_process_model(
        &self,
        process_model_id: &str,
    ) -> StoreResult<Vec<FlowNodeInstance>> {
        let pool = self.provider.current().await?;
        query::by_process_model(&pool, process_model_id).await
    }

    /// All instances of a process model within a correlation, most recent
    /// first.
    pub async fn query_by_correlation_and_process_model(
        &self,
        correlation_id: &str,
        process_model_id: &str,
    ) -> StoreResult<Vec<FlowNodeInstance>> {
        let pool = self.provider.current().await?;
        query::by_correlation_and_process_model(&pool, correlation_id, process_model_id).await
    }

    /// All instances in an explicit state, most recent first.
    pub async fn query_by_state(
        &self,
        state: FlowNodeInstanceState,
    ) -> StoreResult<Vec<FlowNodeInstance>> {
        let pool = self.provider.current().await?;
        query::by_state(&pool, state).await
    }

    /// All running or suspended instances, most recent first.
    pub async fn query_active(&self) -> StoreResult<Vec<FlowNodeInstance>> {
        let pool = self.provider.current().await?;
        query::active(&pool).await
    }

    /// All running or suspended instances of one process instance.
    pub async fn query_active_by_process_instance(
        &self,
        process_instance_id: &str,
    ) -> StoreResult<Vec<FlowNodeInstance>> {
        let pool = self.provider.current().await?;
        query::active_by_process_instance(&pool, process_instance_id).await
    }

    /// All running or suspended instances of a process model within a
    /// correlation.
    pub async fn query_active_by_correlation_and_process_model(
        &self,
        correlation_id: &str,
        process_model_id: &str,
    ) -> StoreResult<Vec<FlowNodeInstance>> {
        let pool = self.provider.current().await?;
        query::active_by_correlation_and_process_model(&pool, correlation_id, process_model_id)
            .await
    }

    /// All suspended instances in a correlation.
    pub async fn query_suspended_by_correlation(
        &self,
        correlation_id: &str,
    ) -> StoreResult<Vec<FlowNodeInstance>> {
        let pool = self.provider.current().await?;
        query::suspended_by_correlation(&pool, correlation_id).await
    }

    /// All suspended instances of a process model.
    pub async fn query_suspended_by_process_model(
        &self,
        process_model_id: &str,
    ) -> StoreResult<Vec<FlowNodeInstance>> {
        let pool = self.provider.current().await?;
        query::suspended_by_process_model(&pool, process_model_id).await
    }

    /// The flattened token histories of every instance in one process
    /// instance. Instances are visited most recent first, each history in
    /// ascending creation order.
    pub async fn query_process_tokens_by_process_instance(
        &self,
        process_instance_id: &str,
    ) -> StoreResult<Vec<ProcessToken>> {
        let pool = self.provider.current().await?;
        query::tokens_by_process_instance(&pool, process_instance_id).await
    }

    // ------------------------------------------------------------------
    // Bulk deletion
    // ------------------------------------------------------------------

    /// Delete every instance of a process model together with all of their
    /// tokens. All-or-nothing: a failure leaves both relations unchanged.
    #[instrument(skip(self))]
    pub async fn delete_by_process_model_id(&self, process_model_id: &str) -> StoreResult<()> {
        let pool = self.provider.current().await?;

        let result = async {
            let mut tx = pool.begin().await.map_err(StoreError::Query)?;

            let tokens = sqlx::query(
                r#"
                DELETE FROM process_tokens
                WHERE instance_id IN (
                    SELECT instance_id FROM flow_node_instances
                    WHERE process_model_id = $1
                )
                "#,
            )
            .bind(process_model_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Query)?;

            let instances = sqlx::query(
                r#"
                DELETE FROM flow_node_instances
                WHERE process_model_id = $1
                "#,
            )
            .bind(process_model_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Query)?;

            tx.commit().await.map_err(StoreError::Query)?;
            Ok((instances.rows_affected(), tokens.rows_affected()))
        }
        .await;

        match result {
            Ok((instances, tokens)) => {
                debug!(
                    process_model_id,
                    instances, tokens, "deleted process model instances"
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    process_model_id,
                    error = %err,
                    "bulk deletion failed, transaction rolled back"
                );
                Err(err)
            }
        }
    }
}

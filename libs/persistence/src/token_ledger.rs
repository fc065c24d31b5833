//! Append-only process token ledger.
//!
//! The store is the only writer, and it only ever appends. Reads return
//! ascending creation order; the autoincrement row id breaks same-instant
//! ties so history always matches append order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use procflow_types::{document, ProcessToken, ProcessTokenType};
use serde_json::Value;
use sqlx::sqlite::SqlitePool;

use crate::error::{StoreError, StoreResult};
use crate::rows::TokenRow;

/// Append one token inside the caller's transaction.
pub(crate) async fn append_within(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    instance_id: &str,
    token_type: ProcessTokenType,
    payload: &Value,
    created_at: DateTime<Utc>,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO process_tokens (instance_id, token_type, payload, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(instance_id)
    .bind(token_type.as_str())
    .bind(document::encode(payload))
    .bind(created_at)
    .execute(&mut **tx)
    .await
    .map_err(StoreError::Query)?;

    Ok(())
}

/// Load one instance's token history in ascending creation order.
pub(crate) async fn history(
    pool: &SqlitePool,
    instance_id: &str,
) -> StoreResult<Vec<ProcessToken>> {
    let rows = sqlx::query_as::<_, TokenRow>(
        r#"
        SELECT instance_id, token_type, payload, created_at
        FROM process_tokens
        WHERE instance_id = $1
        ORDER BY created_at ASC, token_id ASC
        "#,
    )
    .bind(instance_id)
    .fetch_all(pool)
    .await
    .map_err(StoreError::Query)?;

    rows.into_iter().map(TokenRow::into_record).collect()
}

/// Load token histories for a set of instances, keyed by instance id.
/// Each history is in ascending creation order.
pub(crate) async fn for_instances(
    pool: &SqlitePool,
    instance_ids: &[String],
) -> StoreResult<HashMap<String, Vec<ProcessToken>>> {
    if instance_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders = (1..=instance_ids.len())
        .map(|n| format!("${n}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT instance_id, token_type, payload, created_at \
         FROM process_tokens \
         WHERE instance_id IN ({placeholders}) \
         ORDER BY created_at ASC, token_id ASC"
    );

    let mut query = sqlx::query_as::<_, TokenRow>(&sql);
    for id in instance_ids {
        query = query.bind(id);
    }
    let rows = query.fetch_all(pool).await.map_err(StoreError::Query)?;

    let mut by_instance: HashMap<String, Vec<ProcessToken>> =
        HashMap::with_capacity(instance_ids.len());
    for row in rows {
        let token = row.into_record()?;
        by_instance
            .entry(token.instance_id.clone())
            .or_default()
            .push(token);
    }
    Ok(by_instance)
}

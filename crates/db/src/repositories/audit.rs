use std::collections::BTreeMap;

use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use connecthub_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use connecthub_core::domain::quote::QuoteRequestId;

use super::codec::{encode_timestamp, parse_label, parse_timestamp};
use super::{AuditRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditRepository {
    pool: DbPool,
}

impl SqlAuditRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AuditRepository for SqlAuditRepository {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        insert_event(&mut conn, &event).await
    }

    async fn list_for_quote_request(
        &self,
        id: &QuoteRequestId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                occurred_at,
                actor,
                quote_request_id,
                correlation_id,
                event_type,
                category,
                outcome,
                metadata_json
             FROM audit_event
             WHERE quote_request_id = ?
             ORDER BY occurred_at ASC, rowid ASC",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }
}

/// Inserts on an existing connection so lifecycle writes can record audit rows in their own
/// transaction.
pub(crate) async fn insert_event(
    conn: &mut SqliteConnection,
    event: &AuditEvent,
) -> Result<(), RepositoryError> {
    let metadata_json = serde_json::to_string(&event.metadata)
        .map_err(|error| RepositoryError::Decode(format!("invalid audit metadata: {error}")))?;

    sqlx::query(
        "INSERT INTO audit_event (
            id, occurred_at, actor, quote_request_id, correlation_id,
            event_type, category, outcome, metadata_json
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.event_id)
    .bind(encode_timestamp(&event.occurred_at))
    .bind(&event.actor)
    .bind(event.quote_request_id.as_ref().map(QuoteRequestId::as_str))
    .bind(&event.correlation_id)
    .bind(&event.event_type)
    .bind(event.category.as_str())
    .bind(event.outcome.as_str())
    .bind(metadata_json)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn event_from_row(row: SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let metadata_json: String = row.try_get("metadata_json")?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
        .map_err(|error| RepositoryError::Decode(format!("invalid `metadata_json`: {error}")))?;

    Ok(AuditEvent {
        event_id: row.try_get("id")?,
        quote_request_id: row.try_get::<Option<String>, _>("quote_request_id")?.map(QuoteRequestId),
        correlation_id: row.try_get("correlation_id")?,
        event_type: row.try_get("event_type")?,
        category: parse_label::<AuditCategory>("category", row.try_get("category")?)?,
        actor: row.try_get("actor")?,
        outcome: parse_label::<AuditOutcome>("outcome", row.try_get("outcome")?)?,
        metadata,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

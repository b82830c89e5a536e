//! PostgreSQL implementation of OutboxLog.

use async_trait::async_trait;
use sqlx::PgPool;

use super::unit_of_work::row_to_entry;
use crate::domain::foundation::{DomainError, SequenceId};
use crate::ports::{OutboxEntry, OutboxLog};

/// Reads the `outbox` table and keeps cursors in `outbox_cursors`.
#[derive(Clone)]
pub struct PostgresOutboxLog {
    pool: PgPool,
}

impl PostgresOutboxLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxLog for PostgresOutboxLog {
    async fn fetch_after(
        &self,
        after: SequenceId,
        limit: u32,
    ) -> Result<Vec<OutboxEntry>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT sequence_id, topic, payload, created_at
            FROM outbox
            WHERE sequence_id > $1
            ORDER BY sequence_id ASC
            LIMIT $2
            "#,
        )
        .bind(after.as_i64())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch outbox entries", e))?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn load_cursor(&self, consumer_name: &str) -> Result<SequenceId, DomainError> {
        let position: Option<i64> = sqlx::query_scalar(
            "SELECT last_forwarded_sequence_id FROM outbox_cursors WHERE consumer_name = $1",
        )
        .bind(consumer_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to load outbox cursor", e))?;

        Ok(position.map(SequenceId::new).unwrap_or(SequenceId::ORIGIN))
    }

    async fn store_cursor(
        &self,
        consumer_name: &str,
        position: SequenceId,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO outbox_cursors (consumer_name, last_forwarded_sequence_id, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (consumer_name) DO UPDATE SET
                last_forwarded_sequence_id = GREATEST(
                    outbox_cursors.last_forwarded_sequence_id,
                    EXCLUDED.last_forwarded_sequence_id
                ),
                updated_at = NOW()
            "#,
        )
        .bind(consumer_name)
        .bind(position.as_i64())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to store outbox cursor", e))?;

        Ok(())
    }

    async fn purge_through(&self, through: SequenceId) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM outbox WHERE sequence_id <= $1")
            .bind(through.as_i64())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to purge outbox", e))?;

        Ok(result.rows_affected())
    }

    async fn pending_count(&self, after: SequenceId) -> Result<u64, DomainError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE sequence_id > $1")
            .bind(after.as_i64())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to count pending outbox entries", e))?;

        Ok(count.max(0) as u64)
    }
}

//! PostgreSQL implementation of TransactionProvider / UnitOfWork.
//!
//! One `UnitOfWork` is one database transaction. The user row is locked
//! with `SELECT ... FOR UPDATE`; outbox rows are inserted in the same
//! transaction.
//!
//! `BIGSERIAL` values are allocated at insert time but become visible at
//! commit time, so two concurrent writers could commit out of id order and
//! the forwarder would skip the lower id. Appends therefore take a
//! transaction-scoped advisory lock first; it is held until commit or
//! rollback, which serializes "allocate id → commit" across writers.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::domain::foundation::{
    DomainError, ErrorCode, EventEnvelope, SequenceId, Timestamp, UserId,
};
use crate::domain::user::User;
use crate::ports::{OutboxEntry, TransactionProvider, UnitOfWork};

/// Advisory lock key guarding outbox appends ("outbox" in ASCII).
pub const OUTBOX_APPEND_LOCK_KEY: i64 = 0x6f75_7462_6f78;

/// Opens PostgreSQL transactions against the users database.
#[derive(Clone)]
pub struct PostgresTransactionProvider {
    pool: PgPool,
}

impl PostgresTransactionProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionProvider for PostgresTransactionProvider {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DomainError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database("Failed to begin transaction", e))?;

        Ok(Box::new(PostgresUnitOfWork {
            tx: Some(tx),
            holds_append_lock: false,
        }))
    }
}

/// An open PostgreSQL transaction.
///
/// Dropping it without `commit` rolls the transaction back.
pub struct PostgresUnitOfWork {
    tx: Option<Transaction<'static, Postgres>>,
    holds_append_lock: bool,
}

impl PostgresUnitOfWork {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, DomainError> {
        self.tx.as_mut().ok_or_else(|| {
            DomainError::new(ErrorCode::InternalError, "Transaction already finished")
        })
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn lock_user(&mut self, id: UserId) -> Result<Option<User>, DomainError> {
        let tx = self.tx()?;

        let row = sqlx::query("SELECT id, email, points FROM users WHERE id = $1 FOR UPDATE")
            .bind(id.as_i64())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| DomainError::database("Failed to lock user", e))?;

        row.map(|row| {
            let id: i64 = row
                .try_get("id")
                .map_err(|e| DomainError::database("Failed to read users.id", e))?;
            let email: String = row
                .try_get("email")
                .map_err(|e| DomainError::database("Failed to read users.email", e))?;
            let points: i64 = row
                .try_get("points")
                .map_err(|e| DomainError::database("Failed to read users.points", e))?;
            Ok(User::unmarshal(UserId::from_raw(id), email, points))
        })
        .transpose()
    }

    async fn save_user(&mut self, user: &User) -> Result<(), DomainError> {
        let tx = self.tx()?;

        let result = sqlx::query("UPDATE users SET email = $2, points = $3 WHERE id = $1")
            .bind(user.id().as_i64())
            .bind(user.email())
            .bind(user.points())
            .execute(&mut **tx)
            .await
            .map_err(|e| DomainError::database("Failed to update user", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::UserNotFound,
                format!("User {} not found", user.id()),
            ));
        }

        Ok(())
    }

    async fn append_outbox(
        &mut self,
        events: &[EventEnvelope],
    ) -> Result<Vec<SequenceId>, DomainError> {
        let take_lock = !self.holds_append_lock;
        let tx = self.tx()?;

        if take_lock {
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(OUTBOX_APPEND_LOCK_KEY)
                .execute(&mut **tx)
                .await
                .map_err(|e| DomainError::database("Failed to acquire outbox append lock", e))?;
        }

        let mut ids = Vec::with_capacity(events.len());
        for envelope in events {
            let payload = envelope.to_bytes()?;

            let sequence_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO outbox (topic, payload, created_at)
                VALUES ($1, $2, $3)
                RETURNING sequence_id
                "#,
            )
            .bind(&envelope.event_type)
            .bind(payload)
            .bind(Timestamp::now().as_datetime())
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| DomainError::database("Failed to append outbox entry", e))?;

            ids.push(SequenceId::new(sequence_id));
        }

        self.holds_append_lock = true;
        Ok(ids)
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        let tx = self.tx.take().ok_or_else(|| {
            DomainError::new(ErrorCode::InternalError, "Transaction already finished")
        })?;

        tx.commit()
            .await
            .map_err(|e| DomainError::database("Failed to commit transaction", e))
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        match self.tx.take() {
            Some(tx) => tx
                .rollback()
                .await
                .map_err(|e| DomainError::database("Failed to roll back transaction", e)),
            None => Ok(()),
        }
    }
}

/// Maps an `outbox` row to an entry.
pub(crate) fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<OutboxEntry, DomainError> {
    let sequence_id: i64 = row
        .try_get("sequence_id")
        .map_err(|e| DomainError::database("Failed to read outbox.sequence_id", e))?;
    let topic: String = row
        .try_get("topic")
        .map_err(|e| DomainError::database("Failed to read outbox.topic", e))?;
    let payload: Vec<u8> = row
        .try_get("payload")
        .map_err(|e| DomainError::database("Failed to read outbox.payload", e))?;
    let created_at: chrono::DateTime<chrono::Utc> = row
        .try_get("created_at")
        .map_err(|e| DomainError::database("Failed to read outbox.created_at", e))?;

    Ok(OutboxEntry {
        sequence_id: SequenceId::new(sequence_id),
        topic,
        payload,
        created_at: Timestamp::from_datetime(created_at),
    })
}

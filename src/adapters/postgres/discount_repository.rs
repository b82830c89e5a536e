//! PostgreSQL implementation of DiscountRepository (orders database).
//!
//! `apply_once` claims the event id in `processed_events` and bumps the
//! counter in one transaction. If the claim inserts nothing the event was
//! already applied and the transaction is rolled back untouched.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::discount::{ApplyOutcome, CustomerDiscount, DiscountGrant};
use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::ports::DiscountRepository;

/// `processed_events.handler_name` used for discount grants.
const LEDGER_NAME: &str = "customer_discounts";

#[derive(Clone)]
pub struct PostgresDiscountRepository {
    pool: PgPool,
}

impl PostgresDiscountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DiscountRepository for PostgresDiscountRepository {
    async fn apply_once(&self, grant: &DiscountGrant) -> Result<ApplyOutcome, DomainError> {
        if grant.amount <= 0 {
            return Err(DomainError::new(
                ErrorCode::InvalidQuantity,
                "discount must be greater than 0",
            ));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database("Failed to begin transaction", e))?;

        let claimed = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, handler_name, processed_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (event_id, handler_name) DO NOTHING
            "#,
        )
        .bind(grant.event_id.as_str())
        .bind(LEDGER_NAME)
        .execute(&mut *tx)
        .await
        .map_err(|e| DomainError::database("Failed to record processed event", e))?;

        if claimed.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| DomainError::database("Failed to roll back transaction", e))?;
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        sqlx::query(
            r#"
            INSERT INTO customer_discounts (user_id, next_order_discount)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET
                next_order_discount = customer_discounts.next_order_discount
                    + EXCLUDED.next_order_discount
            "#,
        )
        .bind(grant.user_id.as_i64())
        .bind(grant.amount)
        .execute(&mut *tx)
        .await
        .map_err(|e| DomainError::database("Failed to update discount", e))?;

        tx.commit()
            .await
            .map_err(|e| DomainError::database("Failed to commit transaction", e))?;

        Ok(ApplyOutcome::Applied)
    }

    async fn find(&self, user_id: UserId) -> Result<Option<CustomerDiscount>, DomainError> {
        let discount: Option<i64> = sqlx::query_scalar(
            "SELECT next_order_discount FROM customer_discounts WHERE user_id = $1",
        )
        .bind(user_id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch discount", e))?;

        Ok(discount.map(|amount| CustomerDiscount::unmarshal(user_id, amount)))
    }
}

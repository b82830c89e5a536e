//! ApplyDiscount - orders-side consumer of `PointsUsedForDiscount`.
//!
//! Deliveries are at-least-once. Deduplication happens inside
//! `DiscountRepository::apply_once`, in the same local transaction as the
//! counter update, so a redelivered event is acknowledged without effect.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::discount::{ApplyOutcome, DiscountGrant};
use crate::domain::foundation::{DomainError, ErrorCode, EventEnvelope, UserId};
use crate::domain::user::POINTS_USED_FOR_DISCOUNT;
use crate::ports::{DiscountRepository, EventHandler};

/// The fields this service reads from the event payload.
///
/// Decoded separately from the producer's type so unrelated payload fields
/// can change without breaking the consumer.
#[derive(Debug, Deserialize)]
struct PointsUsedPayload {
    user_id: i64,
    points: i64,
}

/// Adds the spent points to the customer's next-order discount.
pub struct ApplyDiscountHandler {
    discounts: Arc<dyn DiscountRepository>,
}

impl ApplyDiscountHandler {
    pub fn new(discounts: Arc<dyn DiscountRepository>) -> Self {
        Self { discounts }
    }

    fn grant_from(event: &EventEnvelope) -> Result<DiscountGrant, DomainError> {
        if event.event_type != POINTS_USED_FOR_DISCOUNT {
            return Err(DomainError::new(
                ErrorCode::ValidationFailed,
                format!("Unexpected event type '{}'", event.event_type),
            )
            .with_detail("event_id", event.event_id.to_string()));
        }

        let payload: PointsUsedPayload = event.payload_as().map_err(|e| {
            DomainError::new(
                ErrorCode::ValidationFailed,
                format!("Cannot decode {} payload: {}", event.event_type, e),
            )
            .with_detail("event_id", event.event_id.to_string())
        })?;

        let user_id = UserId::new(payload.user_id)
            .map_err(|e| DomainError::from(e).with_detail("event_id", event.event_id.to_string()))?;

        if payload.points <= 0 {
            return Err(DomainError::validation(
                "points",
                format!("points must be greater than 0, got {}", payload.points),
            )
            .with_detail("event_id", event.event_id.to_string()));
        }

        Ok(DiscountGrant {
            event_id: event.event_id.clone(),
            user_id,
            amount: payload.points,
        })
    }
}

#[async_trait]
impl EventHandler for ApplyDiscountHandler {
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError> {
        let grant = Self::grant_from(&event)?;

        match self.discounts.apply_once(&grant).await? {
            ApplyOutcome::Applied => info!(
                event_id = %grant.event_id,
                user_id = %grant.user_id,
                amount = grant.amount,
                "Discount applied"
            ),
            ApplyOutcome::AlreadyApplied => debug!(
                event_id = %grant.event_id,
                "Duplicate delivery, discount already applied"
            ),
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "ApplyDiscountHandler"
    }
}

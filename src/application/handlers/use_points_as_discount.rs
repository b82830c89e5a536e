//! UsePointsAsDiscount - spend loyalty points on a next-order discount.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::application::{AggregateTransaction, CommandHandler};
use crate::domain::foundation::{DomainError, SerializableDomainEvent, UserId};
use crate::domain::user::PointsUsedForDiscount;

/// Command to convert `points` of a user's balance into a discount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsePointsAsDiscount {
    pub user_id: UserId,
    pub points: i64,
}

/// Deducts the points and records `PointsUsedForDiscount` in the outbox.
///
/// The discount itself is granted asynchronously by the orders service once
/// the forwarder delivers the event.
pub struct UsePointsAsDiscountHandler {
    transaction: Arc<AggregateTransaction>,
}

impl UsePointsAsDiscountHandler {
    pub fn new(transaction: Arc<AggregateTransaction>) -> Self {
        Self { transaction }
    }
}

#[async_trait]
impl CommandHandler<UsePointsAsDiscount> for UsePointsAsDiscountHandler {
    async fn execute(&self, cmd: UsePointsAsDiscount) -> Result<(), DomainError> {
        let points = cmd.points;

        let committed = self
            .transaction
            .execute(cmd.user_id, move |user| {
                user.use_points(points)?;

                let event = PointsUsedForDiscount::new(user.id(), points);
                Ok(vec![event.to_envelope()?])
            })
            .await?;

        debug!(
            user_id = %cmd.user_id,
            points,
            sequence_ids = ?committed.sequence_ids,
            "Points used for discount"
        );

        Ok(())
    }

    fn command_name(&self) -> &'static str {
        "use_points_as_discount"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::domain::foundation::{ErrorCode, SequenceId};
    use crate::domain::user::{User, POINTS_USED_FOR_DISCOUNT};
    use crate::ports::OutboxLog;

    fn setup(points: i64) -> (InMemoryStore, UsePointsAsDiscountHandler) {
        let store = InMemoryStore::new();
        store.insert_user(User::unmarshal(UserId::from_raw(1), "ann@example.com", points));
        let tx = Arc::new(AggregateTransaction::new(Arc::new(store.clone())));
        (store, UsePointsAsDiscountHandler::new(tx))
    }

    #[tokio::test]
    async fn deducts_points_and_appends_event() {
        let (store, handler) = setup(100);

        handler
            .execute(UsePointsAsDiscount {
                user_id: UserId::from_raw(1),
                points: 25,
            })
            .await
            .unwrap();

        assert_eq!(store.user(UserId::from_raw(1)).unwrap().points(), 75);

        let entries = store.fetch_after(SequenceId::ORIGIN, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].topic, POINTS_USED_FOR_DISCOUNT);

        let envelope = entries[0].decode().unwrap();
        assert_eq!(envelope.aggregate_id, "1");
        assert_eq!(envelope.payload["points"], 25);
        assert_eq!(envelope.payload["user_id"], 1);
    }

    #[tokio::test]
    async fn insufficient_points_appends_nothing() {
        let (store, handler) = setup(100);

        let err = handler
            .execute(UsePointsAsDiscount {
                user_id: UserId::from_raw(1),
                points: 200,
            })
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::InsufficientPoints);
        assert_eq!(store.user(UserId::from_raw(1)).unwrap().points(), 100);
        assert_eq!(store.outbox_len(), 0);
    }

    #[tokio::test]
    async fn non_positive_points_are_rejected() {
        let (store, handler) = setup(100);

        let err = handler
            .execute(UsePointsAsDiscount {
                user_id: UserId::from_raw(1),
                points: 0,
            })
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidQuantity);
        assert_eq!(store.outbox_len(), 0);
    }

    #[tokio::test]
    async fn unknown_user_is_rejected() {
        let (store, handler) = setup(100);

        let err = handler
            .execute(UsePointsAsDiscount {
                user_id: UserId::from_raw(42),
                points: 5,
            })
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::UserNotFound);
        assert_eq!(store.outbox_len(), 0);
    }
}

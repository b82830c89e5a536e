//! Domain events emitted by the User aggregate.
//!
//! These types cross a service boundary: the orders service decodes them from
//! the envelope payload, so field names and types are part of the wire
//! contract. Breaking changes get a new `.vN` topic.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{domain_event, EventId, Timestamp, UserId};

/// Topic for [`PointsUsedForDiscount`].
pub const POINTS_USED_FOR_DISCOUNT: &str = "points_used_for_discount.v1";

/// A user converted points into a discount on their next order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsUsedForDiscount {
    pub event_id: EventId,
    pub user_id: UserId,
    pub points: i64,
    pub occurred_at: Timestamp,
}

impl PointsUsedForDiscount {
    pub fn new(user_id: UserId, points: i64) -> Self {
        Self {
            event_id: EventId::new(),
            user_id,
            points,
            occurred_at: Timestamp::now(),
        }
    }
}

domain_event!(
    PointsUsedForDiscount,
    event_type = "points_used_for_discount.v1",
    schema_version = 1,
    aggregate_id = user_id,
    aggregate_type = "User",
    occurred_at = occurred_at,
    event_id = event_id
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{DomainEvent, SerializableDomainEvent};

    #[test]
    fn event_type_matches_topic_constant() {
        let event = PointsUsedForDiscount::new(UserId::from_raw(3), 25);
        assert_eq!(event.event_type(), POINTS_USED_FOR_DISCOUNT);
        assert_eq!(event.schema_version(), 1);
    }

    #[test]
    fn payload_exposes_stable_wire_fields() {
        let event = PointsUsedForDiscount::new(UserId::from_raw(3), 25);

        let envelope = event.to_envelope().unwrap();

        assert_eq!(envelope.aggregate_id, "3");
        assert_eq!(envelope.payload["user_id"], 3);
        assert_eq!(envelope.payload["points"], 25);
        assert_eq!(envelope.payload["event_id"], event.event_id.as_str());
    }

    #[test]
    fn decodes_back_from_envelope_payload() {
        let event = PointsUsedForDiscount::new(UserId::from_raw(8), 10);
        let envelope = event.to_envelope().unwrap();

        let decoded: PointsUsedForDiscount = envelope.payload_as().unwrap();

        assert_eq!(decoded, event);
    }
}

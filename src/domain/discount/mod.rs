//! Discount module - next-order discount kept by the orders service.
//!
//! This is the remote side of the points transfer. It never talks to the
//! users database; it only learns about spent points through
//! `PointsUsedForDiscount` events, which may arrive more than once.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, ErrorCode, EventId, UserId};

/// Accumulated discount a customer will get on their next order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDiscount {
    user_id: UserId,
    next_order_discount: i64,
}

impl CustomerDiscount {
    /// A customer with no discount yet.
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            next_order_discount: 0,
        }
    }

    /// Reconstructs a discount record from its stored columns.
    pub fn unmarshal(user_id: UserId, next_order_discount: i64) -> Self {
        Self {
            user_id,
            next_order_discount,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn next_order_discount(&self) -> i64 {
        self.next_order_discount
    }

    /// Adds `amount` to the next-order discount.
    ///
    /// Not idempotent on its own; callers deduplicate by event id.
    pub fn add(&mut self, amount: i64) -> Result<(), DomainError> {
        if amount <= 0 {
            return Err(DomainError::new(
                ErrorCode::InvalidQuantity,
                "discount must be greater than 0",
            ));
        }
        self.next_order_discount += amount;
        Ok(())
    }
}

/// Whether an event changed the discount or had already been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    AlreadyApplied,
}

/// A request to grant a discount, keyed by the event that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountGrant {
    pub event_id: EventId,
    pub user_id: UserId,
    pub amount: i64,
}

//! Discount repository port (orders service).
//!
//! The only write is `apply_once`, which records the causing event id and
//! adds to the counter in one local transaction. A second grant with the
//! same event id is a no-op, so redelivered events never double-count.

use async_trait::async_trait;

use crate::domain::discount::{ApplyOutcome, CustomerDiscount, DiscountGrant};
use crate::domain::foundation::{DomainError, UserId};

/// Repository port for the next-order discount.
#[async_trait]
pub trait DiscountRepository: Send + Sync {
    /// Adds `grant.amount` to the customer's discount unless `grant.event_id`
    /// was already applied.
    ///
    /// A customer without a discount row starts at zero.
    ///
    /// # Errors
    ///
    /// - `InvalidQuantity` if the amount is not positive
    /// - `DatabaseError` on persistence failure (nothing applied)
    async fn apply_once(&self, grant: &DiscountGrant) -> Result<ApplyOutcome, DomainError>;

    /// Returns the customer's discount, or `None` if nothing was ever granted.
    async fn find(&self, user_id: UserId) -> Result<Option<CustomerDiscount>, DomainError>;
}

//! User module - points balance aggregate of the users service.
//!
//! # Domain Invariants
//!
//! 1. A user's points balance is never negative
//! 2. Spending points always emits exactly one `PointsUsedForDiscount`
//! 3. A rejected spend changes nothing and emits nothing

mod aggregate;
mod events;

pub use aggregate::User;
pub use events::{PointsUsedForDiscount, POINTS_USED_FOR_DISCOUNT};

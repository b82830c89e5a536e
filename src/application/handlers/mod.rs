//! Command and event handlers.
//!
//! - `UsePointsAsDiscountHandler` - users service write path
//! - `ApplyDiscountHandler` - orders service consumer

mod apply_discount;
mod use_points_as_discount;

pub use apply_discount::ApplyDiscountHandler;
pub use use_points_as_discount::{UsePointsAsDiscount, UsePointsAsDiscountHandler};

//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, events, errors)
//! - `user` - Points balance aggregate (users service, event producer)
//! - `discount` - Next-order discount (orders service, event consumer)

pub mod discount;
pub mod foundation;
pub mod user;

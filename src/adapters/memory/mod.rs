//! In-memory adapters.
//!
//! Implement every storage port without external services. Used by unit and
//! integration tests, and handy for local experiments.

mod discount_repository;
mod metrics;
mod store;

pub use discount_repository::InMemoryDiscountRepository;
pub use metrics::InMemoryMetrics;
pub use store::{FailPoint, InMemoryStore, InMemoryUnitOfWork};

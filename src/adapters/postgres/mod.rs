//! PostgreSQL adapters - Database implementations for storage ports.
//!
//! Users database:
//! - `PostgresTransactionProvider` - Row lock, user update, and outbox append
//!   in one transaction
//! - `PostgresOutboxLog` - Outbox reads and forwarder cursors
//!
//! Orders database:
//! - `PostgresDiscountRepository` - Idempotent discount updates

mod discount_repository;
mod outbox_log;
mod unit_of_work;

pub use discount_repository::PostgresDiscountRepository;
pub use outbox_log::PostgresOutboxLog;
pub use unit_of_work::{PostgresTransactionProvider, PostgresUnitOfWork, OUTBOX_APPEND_LOCK_KEY};

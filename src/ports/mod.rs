//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Write Path (users service)
//!
//! - `TransactionProvider` / `UnitOfWork` - Aggregate row lock, update, and
//!   outbox append in one storage transaction
//!
//! ## Forwarding
//!
//! - `OutboxLog` - Ordered outbox reads and the delivery cursor
//! - `MessageTransport` - Durable pub/sub the forwarder publishes to
//!
//! ## Consuming (orders service)
//!
//! - `EventHandler` / `EventSubscriber` - Delivery of forwarded events
//! - `DiscountRepository` - Idempotent discount updates
//!
//! ## Cross-cutting
//!
//! - `MetricsClient` - Counters for command decorators

mod discount_repository;
mod event_subscriber;
mod message_transport;
mod metrics;
mod outbox_log;
mod unit_of_work;

pub use discount_repository::DiscountRepository;
pub use event_subscriber::{EventHandler, EventSubscriber};
pub use message_transport::MessageTransport;
pub use metrics::MetricsClient;
pub use outbox_log::{OutboxEntry, OutboxLog};
pub use unit_of_work::{TransactionProvider, UnitOfWork};

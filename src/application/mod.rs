//! Application layer - use cases built on the ports.

mod aggregate_transaction;
mod command;
pub mod handlers;

pub use aggregate_transaction::{AggregateTransaction, Committed};
pub use command::{decorate, CommandHandler, LoggingDecorator, MetricsDecorator};

//! Event delivery adapters.
//!
//! - `Forwarder` - Background service relaying the outbox to the transport
//! - `BackoffPolicy` - Retry schedule for the forwarder
//! - `InMemoryEventBus` - Synchronous, in-process transport for testing

mod backoff;
mod forwarder;
mod in_memory;

pub use backoff::BackoffPolicy;
pub use forwarder::{Forwarder, ForwarderConfig, ForwarderError, ForwarderStats, RetentionPolicy};
pub use in_memory::{DeadLetter, InMemoryEventBus};

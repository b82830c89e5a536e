//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `events` - Forwarder, backoff policy, in-memory transport
//! - `memory` - In-memory storage for tests and local runs
//! - `postgres` - PostgreSQL storage (users and orders databases)
//! - `redis` - Redis Streams transport and consumer group subscriber

pub mod events;
pub mod memory;
pub mod postgres;
pub mod redis;

pub use events::{Forwarder, ForwarderConfig, InMemoryEventBus};

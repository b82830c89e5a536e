//! Points Outbox - transactional outbox for points-to-discount transfers
//!
//! A command on the `User` aggregate and the events it produces are committed
//! in one local transaction. A forwarder tails the outbox in sequence order
//! and publishes to Redis Streams; the orders side applies each event once.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;

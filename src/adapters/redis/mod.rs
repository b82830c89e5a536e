//! Redis Streams adapters.
//!
//! - `RedisStreamTransport` - `MessageTransport` used by the forwarder
//! - `RedisStreamSubscriber` - consumer group delivering to `EventHandler`s

mod stream_subscriber;
mod stream_transport;

pub use stream_subscriber::{RedisStreamSubscriber, RedisStreamSubscriberConfig};
pub use stream_transport::{connect, RedisStreamTransport, ENVELOPE_FIELD};

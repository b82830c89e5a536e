//! Redis Streams implementation of MessageTransport.
//!
//! Each topic is one stream. A publish is `XADD <topic> * envelope <json>`;
//! Redis replies with the entry id only once the entry is stored, which is
//! the acknowledgement the forwarder waits for.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::domain::foundation::{DomainError, ErrorCode, EventEnvelope};
use crate::ports::MessageTransport;

/// Stream field holding the serialized envelope.
pub const ENVELOPE_FIELD: &str = "envelope";

/// Opens a multiplexed connection to `url`.
pub async fn connect(url: &str) -> Result<MultiplexedConnection, DomainError> {
    let client = redis::Client::open(url)
        .map_err(|e| DomainError::transport("Invalid Redis URL", e))?;

    client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| DomainError::transport("Failed to connect to Redis", e))
}

/// Publishes envelopes to Redis Streams.
pub struct RedisStreamTransport {
    conn: MultiplexedConnection,
    closed: AtomicBool,
}

impl RedisStreamTransport {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MessageTransport for RedisStreamTransport {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), DomainError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DomainError::new(ErrorCode::TransportError, "Transport is closed"));
        }

        let json = serde_json::to_string(event).map_err(|e| {
            DomainError::new(
                ErrorCode::InternalError,
                format!("Failed to serialize envelope: {}", e),
            )
        })?;

        let mut conn = self.conn.clone();
        let stream_id: String = conn
            .xadd(&event.event_type, "*", &[(ENVELOPE_FIELD, json)])
            .await
            .map_err(|e: redis::RedisError| DomainError::transport("XADD failed", e))?;

        debug!(
            topic = %event.event_type,
            event_id = %event.event_id,
            stream_id = %stream_id,
            "Published to stream"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), DomainError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Redis stream transport closed");
        }
        Ok(())
    }
}

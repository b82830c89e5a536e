//! MessageTransport port - the durable pub/sub the forwarder publishes to.
//!
//! The forwarder only needs two promises from the transport:
//! - Once `publish` returns `Ok`, the message is durably queued and will be
//!   delivered at least once to every subscriber group of its topic
//! - Ordering is whatever the transport provides per topic; nothing more
//!
//! A transport handle is created at startup, passed to whoever needs it, and
//! closed at shutdown. It is never global state.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventEnvelope};

/// Port for publishing event envelopes under their topic.
///
/// The topic is the envelope's `event_type`.
///
/// # Example
///
/// ```ignore
/// let envelope = entry.decode()?;
/// transport.publish(&envelope).await?;
/// outbox.store_cursor("users-forwarder", entry.sequence_id).await?;
/// ```
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Publish one envelope. `Ok` means the transport acknowledged it.
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), DomainError>;

    /// Release connections held by this handle.
    async fn close(&self) -> Result<(), DomainError> {
        Ok(())
    }
}

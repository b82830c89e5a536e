//! OutboxLog port - read side of the transactional outbox.
//!
//! Entries are appended by the aggregate transaction (see `UnitOfWork`) and
//! only ever read here. The forwarder tails the log from its delivery
//! cursor, publishes each entry, and moves the cursor forward.
//!
//! ## Delivery Cursor
//!
//! One `(consumer_name, last_forwarded_sequence_id)` record per forwarder,
//! stored in the same database as the log. A restarted forwarder resumes from
//! the stored position, which may re-publish the last entry if the process
//! died between the transport ack and the cursor write.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, ErrorCode, EventEnvelope, SequenceId, Timestamp};

/// A persisted event waiting to be forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Position in the log, assigned by the store
    pub sequence_id: SequenceId,

    /// Routing key for the transport (the envelope's event type)
    pub topic: String,

    /// JSON-encoded `EventEnvelope`
    pub payload: Vec<u8>,

    /// When the entry was appended
    pub created_at: Timestamp,
}

impl OutboxEntry {
    /// Builds an entry for an envelope at a given position.
    pub fn from_envelope(
        sequence_id: SequenceId,
        envelope: &EventEnvelope,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            sequence_id,
            topic: envelope.event_type.clone(),
            payload: envelope.to_bytes()?,
            created_at: Timestamp::now(),
        })
    }

    /// Decodes the stored envelope.
    ///
    /// # Errors
    ///
    /// `MalformedOutboxEntry` if the payload does not decode or its event type
    /// disagrees with the stored topic.
    pub fn decode(&self) -> Result<EventEnvelope, DomainError> {
        let envelope = EventEnvelope::from_bytes(&self.payload)
            .map_err(|e| e.with_detail("sequence_id", self.sequence_id.to_string()))?;

        if envelope.event_type != self.topic {
            return Err(DomainError::new(
                ErrorCode::MalformedOutboxEntry,
                format!(
                    "Outbox topic '{}' does not match envelope type '{}'",
                    self.topic, envelope.event_type
                ),
            )
            .with_detail("sequence_id", self.sequence_id.to_string()));
        }

        Ok(envelope)
    }
}

/// Port for reading the outbox and tracking delivery progress.
///
/// Only the forwarder calls this port. Implementations should:
/// - Return entries strictly after the given position, ascending
/// - Persist cursors durably before returning from `store_cursor`
/// - Never move a cursor backwards
#[async_trait]
pub trait OutboxLog: Send + Sync {
    /// Entries with sequence id greater than `after`, ascending, at most `limit`.
    async fn fetch_after(
        &self,
        after: SequenceId,
        limit: u32,
    ) -> Result<Vec<OutboxEntry>, DomainError>;

    /// Stored cursor for a consumer, or `SequenceId::ORIGIN` if none exists.
    async fn load_cursor(&self, consumer_name: &str) -> Result<SequenceId, DomainError>;

    /// Records that every entry up to and including `position` was published.
    async fn store_cursor(
        &self,
        consumer_name: &str,
        position: SequenceId,
    ) -> Result<(), DomainError>;

    /// Deletes forwarded entries with sequence id at or below `through`.
    ///
    /// Returns the number of entries deleted.
    async fn purge_through(&self, through: SequenceId) -> Result<u64, DomainError>;

    /// Number of entries after `after` (forwarding backlog).
    async fn pending_count(&self, after: SequenceId) -> Result<u64, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_takes_topic_from_envelope() {
        let envelope = EventEnvelope::test_fixture();

        let entry = OutboxEntry::from_envelope(SequenceId::new(4), &envelope).unwrap();

        assert_eq!(entry.sequence_id, SequenceId::new(4));
        assert_eq!(entry.topic, "test.event.v1");
        assert_eq!(entry.decode().unwrap(), envelope);
    }

    #[test]
    fn decode_rejects_unparseable_payload() {
        let entry = OutboxEntry {
            sequence_id: SequenceId::new(1),
            topic: "test.event.v1".to_string(),
            payload: b"not an envelope".to_vec(),
            created_at: Timestamp::now(),
        };

        let err = entry.decode().unwrap_err();

        assert_eq!(err.code, ErrorCode::MalformedOutboxEntry);
        assert_eq!(err.details.get("sequence_id"), Some(&"1".to_string()));
    }

    #[test]
    fn decode_rejects_topic_mismatch() {
        let envelope = EventEnvelope::test_fixture();
        let mut entry = OutboxEntry::from_envelope(SequenceId::new(2), &envelope).unwrap();
        entry.topic = "other.topic.v1".to_string();

        let err = entry.decode().unwrap_err();

        assert_eq!(err.code, ErrorCode::MalformedOutboxEntry);
    }

    #[test]
    fn outbox_log_is_object_safe() {
        fn _accepts_dyn(_log: &dyn OutboxLog) {}
    }
}

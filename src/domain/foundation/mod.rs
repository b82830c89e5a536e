//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, event envelopes, and error types
//! shared by the points aggregate, the outbox, and the discount consumer.

mod errors;
mod events;
mod ids;
mod timestamp;

pub use errors::{DomainError, ErrorCategory, ErrorCode, ValidationError};
pub use events::{
    domain_event, DomainEvent, EventEnvelope, EventId, EventMetadata, SerializableDomainEvent,
};
pub use ids::{SequenceId, UserId};
pub use timestamp::Timestamp;

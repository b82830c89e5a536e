//! EventSubscriber port - Interface for receiving forwarded events.
//!
//! Handlers live in the consuming service. The transport calls them for every
//! delivery, which can be more than once per event and in any order relative
//! to other producers.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, EventEnvelope};

/// Handler for processing delivered events.
///
/// Implementations must be idempotent: handling the same event twice leaves
/// the same state as handling it once.
///
/// The returned error tells the transport what to do next:
/// - retryable (`DomainError::is_retryable`) - not applied yet, redeliver later
/// - anything else - terminal, acknowledge and do not redeliver
///
/// # Example
///
/// ```ignore
/// struct DiscountUpdater { /* ... */ }
///
/// #[async_trait]
/// impl EventHandler for DiscountUpdater {
///     async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError> {
///         let payload: PointsUsedForDiscount = event.payload_as()?;
///         // Update the discount...
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "DiscountUpdater"
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process an event.
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError>;

    /// Handler name for logging and deduplication keys.
    fn name(&self) -> &'static str;
}

/// Port for subscribing to events by topic.
pub trait EventSubscriber: Send + Sync {
    /// Subscribe handler to a specific event type.
    fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler>);

    /// Subscribe handler to multiple event types.
    fn subscribe_all(&self, event_types: &[&str], handler: Arc<dyn EventHandler>);
}

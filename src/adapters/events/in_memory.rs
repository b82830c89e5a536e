//! In-memory message transport for testing.
//!
//! Delivers synchronously to subscribed handlers, which keeps tests
//! deterministic, while still behaving like an at-least-once broker:
//!
//! - A publish is accepted even if a consumer fails; consumer failures never
//!   flow back to the producer
//! - A retryable handler failure leaves the delivery pending until
//!   `redeliver_pending` is called
//! - A terminal handler failure moves the delivery to the dead letters
//! - `replay_published` delivers every accepted message again, the way a
//!   broker does after a consumer loses its acknowledgements
//!
//! Outages and slow publishes can be simulated with `set_unavailable` and
//! `set_publish_delay`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use crate::domain::foundation::{DomainError, ErrorCode, EventEnvelope};
use crate::ports::{EventHandler, EventSubscriber, MessageTransport};

/// A delivery a handler rejected with a terminal error.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub handler: &'static str,
    pub event: EventEnvelope,
    pub error: DomainError,
}

/// In-memory event bus for testing.
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(InMemoryEventBus::new());
/// bus.subscribe(POINTS_USED_FOR_DISCOUNT, Arc::new(handler));
///
/// bus.publish(&envelope).await?;
///
/// assert_eq!(bus.event_count(), 1);
/// assert!(bus.has_event(POINTS_USED_FOR_DISCOUNT));
/// ```
#[derive(Default)]
pub struct InMemoryEventBus {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
    published: Mutex<Vec<EventEnvelope>>,
    pending: Mutex<Vec<(Arc<dyn EventHandler>, EventEnvelope)>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    publish_delay: Mutex<Option<Duration>>,
    unavailable: AtomicBool,
    closed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryEventBus {
    /// Creates a new empty event bus.
    pub fn new() -> Self {
        Self::default()
    }

    // === Fault Injection ===

    /// Makes every publish fail with a transport error while `true`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delays every publish, for exercising publish timeouts.
    pub fn set_publish_delay(&self, delay: Option<Duration>) {
        *lock(&self.publish_delay) = delay;
    }

    // === Test Helpers ===

    /// Returns all accepted messages in publish order, duplicates included.
    pub fn published_events(&self) -> Vec<EventEnvelope> {
        lock(&self.published).clone()
    }

    /// Returns accepted messages of a specific type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<EventEnvelope> {
        self.published_events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Returns count of accepted messages.
    pub fn event_count(&self) -> usize {
        lock(&self.published).len()
    }

    /// Checks if a specific event type was published.
    pub fn has_event(&self, event_type: &str) -> bool {
        lock(&self.published)
            .iter()
            .any(|e| e.event_type == event_type)
    }

    /// Number of deliveries waiting for `redeliver_pending`.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Deliveries rejected with a terminal error.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        lock(&self.dead_letters).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Retries every pending delivery once.
    ///
    /// Returns how many succeeded; failures are requeued or dead-lettered.
    pub async fn redeliver_pending(&self) -> usize {
        let pending: Vec<_> = std::mem::take(&mut *lock(&self.pending));

        let mut delivered = 0;
        for (handler, event) in pending {
            if self.deliver(handler, event).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Delivers every accepted message to its handlers again.
    pub async fn replay_published(&self) {
        for event in self.published_events() {
            self.dispatch(&event).await;
        }
    }

    async fn dispatch(&self, event: &EventEnvelope) {
        // Clone handlers to release lock before await points
        let type_handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        for handler in type_handlers {
            self.deliver(handler, event.clone()).await;
        }
    }

    async fn deliver(&self, handler: Arc<dyn EventHandler>, event: EventEnvelope) -> bool {
        match handler.handle(event.clone()).await {
            Ok(()) => true,
            Err(error) if error.is_retryable() => {
                lock(&self.pending).push((handler, event));
                false
            }
            Err(error) => {
                lock(&self.dead_letters).push(DeadLetter {
                    handler: handler.name(),
                    event,
                    error,
                });
                false
            }
        }
    }
}

#[async_trait]
impl MessageTransport for InMemoryEventBus {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), DomainError> {
        if self.is_closed() {
            return Err(DomainError::new(ErrorCode::TransportError, "Transport is closed"));
        }

        let delay = *lock(&self.publish_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::TransportError,
                "Transport unavailable",
            ));
        }

        lock(&self.published).push(event.clone());
        self.dispatch(event).await;
        Ok(())
    }

    async fn close(&self) -> Result<(), DomainError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl EventSubscriber for InMemoryEventBus {
    fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
    }

    fn subscribe_all(&self, event_types: &[&str], handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        for event_type in event_types {
            handlers
                .entry(event_type.to_string())
                .or_default()
                .push(handler.clone());
        }
    }
}

//! Forwarder - Background service that relays outbox entries to the transport.
//!
//! This service implements the second half of the Transactional Outbox Pattern:
//! 1. The aggregate transaction appends events to the outbox (same transaction
//!    as the state change)
//! 2. **The forwarder tails the outbox and publishes to the transport** ← This module
//!
//! ## Delivery Guarantees
//!
//! - Entries are published strictly in sequence order, one at a time
//! - The cursor is stored after every acknowledged publish, never before
//! - A crash between acknowledgement and cursor write republishes that one
//!   entry on restart (at-least-once, consumers deduplicate by event id)
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `consumer_name` | `outbox-forwarder` | Key of the stored cursor |
//! | `poll_interval` | 100ms | Idle wait once the outbox is drained |
//! | `batch_size` | 100 | Max entries read per poll cycle |
//! | `publish_timeout` | 5s | Bound on one publish attempt |
//! | `backoff` | 100ms..30s, ±10% | Delay between failed cycles |
//! | `retention` | `Retain` | Whether forwarded entries are deleted |
//!
//! ## Failure Handling
//!
//! - Transport and storage failures are retried forever with backoff
//! - A malformed entry stops the loop with `ForwarderError::MalformedEntry`;
//!   the cursor stays before it so nothing behind it is skipped
//!
//! ## Graceful Shutdown
//!
//! The shutdown signal is checked before every publish and interrupts poll
//! and backoff sleeps. The cursor is left at the last acknowledged entry.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info, warn};

use super::BackoffPolicy;
use crate::domain::foundation::{DomainError, ErrorCode, SequenceId};
use crate::ports::{MessageTransport, OutboxEntry, OutboxLog};

/// What happens to outbox entries after they are forwarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Keep forwarded entries as an audit log.
    #[default]
    Retain,
    /// Delete entries up to the cursor after each batch.
    DeleteForwarded,
}

/// Configuration for the Forwarder service.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Key under which the cursor is stored.
    pub consumer_name: String,

    /// Maximum entries to read per poll cycle.
    pub batch_size: u32,

    /// How long to wait before polling again once caught up.
    pub poll_interval: Duration,

    /// Upper bound on one publish attempt.
    pub publish_timeout: Duration,

    pub backoff: BackoffPolicy,

    pub retention: RetentionPolicy,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            consumer_name: "outbox-forwarder".to_string(),
            batch_size: 100,
            poll_interval: Duration::from_millis(100),
            publish_timeout: Duration::from_secs(5),
            backoff: BackoffPolicy::default(),
            retention: RetentionPolicy::default(),
        }
    }
}

impl ForwarderConfig {
    pub fn with_consumer_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_name = name.into();
        self
    }

    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }
}

/// Why a forwarding cycle stopped.
#[derive(Debug, Error)]
pub enum ForwarderError {
    /// Committed entry cannot be decoded. Needs an operator.
    #[error("outbox entry {sequence_id} is malformed: {reason}")]
    MalformedEntry {
        sequence_id: SequenceId,
        reason: String,
    },

    /// Outbox read or cursor write failed.
    #[error("outbox storage failed: {0}")]
    Storage(#[source] DomainError),

    /// Publish was rejected or timed out.
    #[error("publishing entry {sequence_id} failed: {source}")]
    Transport {
        sequence_id: SequenceId,
        #[source]
        source: DomainError,
    },
}

impl ForwarderError {
    /// Whether another cycle may succeed. Only malformed entries are permanent.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ForwarderError::MalformedEntry { .. })
    }
}

/// Snapshot of forwarder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    /// Entries acknowledged by the transport (including republished ones).
    pub published: u64,
    /// Failed cycles that were retried.
    pub retries: u64,
    /// Completed poll cycles.
    pub batches: u64,
    /// Highest sequence id stored as cursor by this instance.
    pub last_forwarded: SequenceId,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    retries: AtomicU64,
    batches: AtomicU64,
    last_forwarded: AtomicI64,
}

/// Background service that publishes outbox entries in sequence order.
pub struct Forwarder {
    outbox: Arc<dyn OutboxLog>,
    transport: Arc<dyn MessageTransport>,
    config: ForwarderConfig,
    counters: Counters,
}

impl Forwarder {
    /// Create a new Forwarder with default configuration.
    pub fn new(outbox: Arc<dyn OutboxLog>, transport: Arc<dyn MessageTransport>) -> Self {
        Self::with_config(outbox, transport, ForwarderConfig::default())
    }

    /// Create a new Forwarder with custom configuration.
    pub fn with_config(
        outbox: Arc<dyn OutboxLog>,
        transport: Arc<dyn MessageTransport>,
        config: ForwarderConfig,
    ) -> Self {
        Self {
            outbox,
            transport,
            config,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub fn stats(&self) -> ForwarderStats {
        ForwarderStats {
            published: self.counters.published.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            batches: self.counters.batches.load(Ordering::Relaxed),
            last_forwarded: SequenceId::new(self.counters.last_forwarded.load(Ordering::Relaxed)),
        }
    }

    /// Number of committed entries after the stored cursor.
    pub async fn backlog(&self) -> Result<u64, DomainError> {
        let cursor = self.outbox.load_cursor(&self.config.consumer_name).await?;
        self.outbox.pending_count(cursor).await
    }

    /// Run the forwarding loop until shutdown signal is received.
    ///
    /// Returns `Ok(())` on graceful shutdown and `Err` only for malformed
    /// entries; every other failure is retried.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), ForwarderError> {
        info!(
            consumer = %self.config.consumer_name,
            batch_size = self.config.batch_size,
            "Forwarder started"
        );

        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.forward(Some(&shutdown)).await {
                Ok(forwarded) => {
                    attempt = 0;
                    if forwarded < self.config.batch_size as usize
                        && sleep_or_shutdown(self.config.poll_interval, &mut shutdown).await
                    {
                        break;
                    }
                }
                Err(err) if err.is_retryable() => {
                    let delay = self.config.backoff.delay_for(attempt);
                    attempt = attempt.saturating_add(1);
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);

                    warn!(
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Forwarding failed, backing off"
                    );

                    if sleep_or_shutdown(delay, &mut shutdown).await {
                        break;
                    }
                }
                Err(err) => {
                    error!(error = %err, "Forwarder halted on malformed outbox entry");
                    return Err(err);
                }
            }
        }

        info!(
            consumer = %self.config.consumer_name,
            last_forwarded = %self.stats().last_forwarded,
            "Forwarder stopped"
        );
        Ok(())
    }

    /// Run exactly one poll cycle.
    ///
    /// Returns how many entries were forwarded. Useful for tests and
    /// for driving the forwarder without the loop.
    pub async fn forward_batch(&self) -> Result<usize, ForwarderError> {
        self.forward(None).await
    }

    async fn forward(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<usize, ForwarderError> {
        let consumer = self.config.consumer_name.as_str();

        let cursor = self
            .outbox
            .load_cursor(consumer)
            .await
            .map_err(ForwarderError::Storage)?;

        let entries = self
            .outbox
            .fetch_after(cursor, self.config.batch_size)
            .await
            .map_err(ForwarderError::Storage)?;

        let mut forwarded = 0;
        let mut last = None;

        for entry in &entries {
            if shutdown.map_or(false, |rx| *rx.borrow()) {
                debug!(sequence_id = %entry.sequence_id, "Shutdown requested mid-batch");
                break;
            }

            self.publish(entry).await?;

            self.outbox
                .store_cursor(consumer, entry.sequence_id)
                .await
                .map_err(ForwarderError::Storage)?;

            self.counters
                .last_forwarded
                .fetch_max(entry.sequence_id.as_i64(), Ordering::Relaxed);
            forwarded += 1;
            last = Some(entry.sequence_id);
        }

        if let (RetentionPolicy::DeleteForwarded, Some(through)) = (self.config.retention, last) {
            match self.outbox.purge_through(through).await {
                Ok(deleted) => debug!(through = %through, deleted, "Purged forwarded entries"),
                Err(err) => warn!(through = %through, error = %err, "Failed to purge outbox"),
            }
        }

        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        if forwarded > 0 {
            debug!(forwarded, last = ?last, "Batch forwarded");
        }

        Ok(forwarded)
    }

    async fn publish(&self, entry: &OutboxEntry) -> Result<(), ForwarderError> {
        let envelope = entry
            .decode()
            .map_err(|e| ForwarderError::MalformedEntry {
                sequence_id: entry.sequence_id,
                reason: e.message,
            })?;

        let outcome = time::timeout(self.config.publish_timeout, self.transport.publish(&envelope))
            .await
            .unwrap_or_else(|_| {
                Err(DomainError::new(
                    ErrorCode::Timeout,
                    format!(
                        "Publish timed out after {}ms",
                        self.config.publish_timeout.as_millis()
                    ),
                ))
            });

        outcome.map_err(|source| ForwarderError::Transport {
            sequence_id: entry.sequence_id,
            source,
        })?;

        self.counters.published.fetch_add(1, Ordering::Relaxed);
        debug!(
            sequence_id = %entry.sequence_id,
            topic = %entry.topic,
            event_id = %envelope.event_id,
            "Entry published"
        );
        Ok(())
    }
}

/// Sleeps for `duration` unless shutdown is signalled first.
///
/// Returns `true` if the caller should stop.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }

    tokio::select! {
        _ = time::sleep(duration) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

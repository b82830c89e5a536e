//! Redis Streams consumer group subscriber.
//!
//! Reads the subscribed topics with `XREADGROUP` and hands each envelope to
//! the registered handlers:
//!
//! - success, or a terminal handler error: `XACK`
//! - retryable handler error: no ack, the entry stays in the group's pending
//!   list and is read again after a backoff
//!
//! On start, and after any retryable failure, the subscriber pages through
//! its own pending entries (id `0`) until a read comes back empty, and only
//! then asks for new ones (id `>`). That is how deliveries unacknowledged
//! before a crash get redelivered.
//!
//! Entries left pending by a consumer that never comes back are moved to this
//! consumer with a periodic `XAUTOCLAIM` sweep (Redis 6.2+) once they have
//! been idle for `claim_min_idle`.

use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::stream_transport::ENVELOPE_FIELD;
use crate::adapters::events::BackoffPolicy;
use crate::domain::foundation::{DomainError, ErrorCode, EventEnvelope};
use crate::ports::{EventHandler, EventSubscriber};

/// Cursor that starts an `XAUTOCLAIM` scan and marks its end.
const CLAIM_CURSOR_START: &str = "0-0";

/// Consumer group settings.
#[derive(Debug, Clone)]
pub struct RedisStreamSubscriberConfig {
    /// Consumer group; each group receives every entry once.
    pub group: String,

    /// This consumer's name within the group.
    pub consumer: String,

    /// Max entries per read.
    pub read_count: usize,

    /// How long a read for new entries blocks.
    pub block: Duration,

    /// Idle time after which another consumer's pending entry is claimed.
    pub claim_min_idle: Duration,

    /// Time between `XAUTOCLAIM` sweeps.
    pub claim_interval: Duration,

    pub backoff: BackoffPolicy,
}

impl Default for RedisStreamSubscriberConfig {
    fn default() -> Self {
        Self {
            group: "orders-svc".to_string(),
            consumer: "orders-svc-1".to_string(),
            read_count: 10,
            block: Duration::from_secs(1),
            claim_min_idle: Duration::from_secs(60),
            claim_interval: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
        }
    }
}

enum Delivery {
    Acked,
    Retry,
}

/// Subscriber backed by a Redis Streams consumer group.
pub struct RedisStreamSubscriber {
    conn: MultiplexedConnection,
    config: RedisStreamSubscriberConfig,
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
}

impl RedisStreamSubscriber {
    pub fn new(conn: MultiplexedConnection, config: RedisStreamSubscriberConfig) -> Self {
        Self {
            conn,
            config,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        topics.sort();
        topics
    }

    fn handlers_for(&self, topic: &str) -> Vec<Arc<dyn EventHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Creates the consumer group on every subscribed stream.
    ///
    /// Streams are created if missing; an existing group is left untouched.
    pub async fn ensure_groups(&self) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();

        for topic in self.topics() {
            let created: Result<(), redis::RedisError> = conn
                .xgroup_create_mkstream(&topic, &self.config.group, "0")
                .await;

            match created {
                Ok(()) => info!(
                    topic = %topic,
                    group = %self.config.group,
                    "Consumer group created"
                ),
                Err(e) if e.code() == Some("BUSYGROUP") => {}
                Err(e) => return Err(DomainError::transport("XGROUP CREATE failed", e)),
            }
        }
        Ok(())
    }

    /// Consumes until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), DomainError> {
        self.ensure_groups().await?;

        let topics = self.topics();
        if topics.is_empty() {
            warn!("No subscriptions, subscriber exits");
            return Ok(());
        }

        info!(
            group = %self.config.group,
            consumer = %self.config.consumer,
            topics = ?topics,
            "Stream subscriber started"
        );

        let mut read_pending = true;
        let mut attempt: u32 = 0;
        let mut last_claim: Option<Instant> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = Instant::now();
            if claim_due(last_claim, now, self.config.claim_interval) {
                last_claim = Some(now);
                match self.claim_idle(&topics).await {
                    Ok(0) => {}
                    Ok(claimed) => {
                        info!(claimed, "Claimed idle entries from other consumers");
                        read_pending = true;
                    }
                    Err(e) => warn!(error = %e, "XAUTOCLAIM failed, idle entries stay where they are"),
                }
            }

            let start_id = if read_pending { "0" } else { ">" };

            let read = tokio::select! {
                read = self.read(&topics, start_id) => read,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let (delivered, retry) = match read {
                Ok(entries) => {
                    let delivered = entries.len();
                    let mut retry = false;
                    for (topic, entry) in entries {
                        if let Delivery::Retry = self.deliver(&topic, &entry).await {
                            retry = true;
                        }
                    }
                    (delivered, retry)
                }
                Err(e) => {
                    warn!(error = %e, "XREADGROUP failed");
                    (0, true)
                }
            };

            let was_pending = read_pending;
            read_pending = next_read_pending(read_pending, delivered, retry);
            if was_pending && !read_pending {
                debug!("Pending entries drained");
            }

            if retry {
                let delay = self.config.backoff.delay_for(attempt);
                attempt = attempt.saturating_add(1);

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            } else {
                attempt = 0;
            }
        }

        info!(consumer = %self.config.consumer, "Stream subscriber stopped");
        Ok(())
    }

    async fn read(
        &self,
        topics: &[String],
        start_id: &str,
    ) -> Result<Vec<(String, StreamId)>, DomainError> {
        let mut options = StreamReadOptions::default()
            .group(&self.config.group, &self.config.consumer)
            .count(self.config.read_count);
        if start_id == ">" {
            options = options.block(self.config.block.as_millis() as usize);
        }

        let ids = vec![start_id; topics.len()];
        let mut conn = self.conn.clone();
        let reply: Option<StreamReadReply> = conn
            .xread_options(topics, ids.as_slice(), &options)
            .await
            .map_err(|e: redis::RedisError| DomainError::transport("XREADGROUP failed", e))?;

        Ok(reply
            .map(|reply| {
                reply
                    .keys
                    .into_iter()
                    .flat_map(|key| {
                        let topic = key.key;
                        key.ids.into_iter().map(move |id| (topic.clone(), id))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Moves entries idle longer than `claim_min_idle` into this consumer's
    /// pending list, where the next pending read delivers them.
    async fn claim_idle(&self, topics: &[String]) -> Result<usize, DomainError> {
        let min_idle_ms = self.config.claim_min_idle.as_millis() as u64;
        let mut conn = self.conn.clone();
        let mut claimed = 0;

        for topic in topics {
            let mut cursor = CLAIM_CURSOR_START.to_string();
            loop {
                let reply: Value = redis::cmd("XAUTOCLAIM")
                    .arg(topic)
                    .arg(&self.config.group)
                    .arg(&self.config.consumer)
                    .arg(min_idle_ms)
                    .arg(&cursor)
                    .arg("COUNT")
                    .arg(self.config.read_count)
                    .arg("JUSTID")
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| DomainError::transport("XAUTOCLAIM failed", e))?;

                let (next, ids) = parse_autoclaim(&reply)?;
                if !ids.is_empty() {
                    debug!(topic = %topic, count = ids.len(), "Claimed idle entries");
                }
                claimed += ids.len();

                if next == CLAIM_CURSOR_START {
                    break;
                }
                cursor = next;
            }
        }
        Ok(claimed)
    }

    async fn deliver(&self, topic: &str, entry: &StreamId) -> Delivery {
        let envelope = match decode(entry) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(topic, stream_id = %entry.id, error = %e, "Undecodable stream entry, dropping");
                return self.ack(topic, &entry.id).await;
            }
        };

        for handler in self.handlers_for(topic) {
            match handler.handle(envelope.clone()).await {
                Ok(()) => {}
                Err(e) if e.is_retryable() => {
                    warn!(
                        handler = handler.name(),
                        event_id = %envelope.event_id,
                        error = %e,
                        "Handler failed, entry left pending"
                    );
                    return Delivery::Retry;
                }
                Err(e) => {
                    error!(
                        handler = handler.name(),
                        event_id = %envelope.event_id,
                        error = %e,
                        "Handler rejected event, acknowledging without effect"
                    );
                }
            }
        }

        self.ack(topic, &entry.id).await
    }

    async fn ack(&self, topic: &str, stream_id: &str) -> Delivery {
        let mut conn = self.conn.clone();
        let acked: Result<i64, redis::RedisError> =
            conn.xack(topic, &self.config.group, &[stream_id]).await;

        match acked {
            Ok(_) => Delivery::Acked,
            Err(e) => {
                warn!(topic, stream_id, error = %e, "XACK failed, entry will be redelivered");
                Delivery::Retry
            }
        }
    }
}

/// Whether the next read asks for this consumer's pending entries.
///
/// A pending read that returned anything may have left more behind it, so
/// paging continues until a pending read comes back empty.
fn next_read_pending(read_pending: bool, delivered: usize, retry: bool) -> bool {
    retry || (read_pending && delivered > 0)
}

fn claim_due(last_claim: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match last_claim {
        None => true,
        Some(last) => now.saturating_duration_since(last) >= interval,
    }
}

/// Splits a `XAUTOCLAIM ... JUSTID` reply into the next cursor and the
/// claimed ids. Redis 7 appends a list of deleted ids, which is ignored.
fn parse_autoclaim(reply: &Value) -> Result<(String, Vec<String>), DomainError> {
    let malformed = || DomainError::new(ErrorCode::TransportError, "Unexpected XAUTOCLAIM reply");

    match reply {
        Value::Bulk(items) if items.len() >= 2 => {
            let cursor: String = redis::from_redis_value(&items[0]).map_err(|_| malformed())?;
            let ids: Vec<String> = redis::from_redis_value(&items[1]).map_err(|_| malformed())?;
            Ok((cursor, ids))
        }
        _ => Err(malformed()),
    }
}

fn decode(entry: &StreamId) -> Result<EventEnvelope, DomainError> {
    let json: String = entry.get(ENVELOPE_FIELD).ok_or_else(|| {
        DomainError::validation(ENVELOPE_FIELD, "Stream entry has no envelope field")
    })?;

    serde_json::from_str(&json)
        .map_err(|e| DomainError::validation(ENVELOPE_FIELD, format!("Invalid envelope: {}", e)))
}

impl EventSubscriber for RedisStreamSubscriber {
    fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
    }

    fn subscribe_all(&self, event_types: &[&str], handler: Arc<dyn EventHandler>) {
        for event_type in event_types {
            self.subscribe(event_type, handler.clone());
        }
    }
}

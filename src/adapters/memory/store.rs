//! In-memory users database: user table, outbox, and delivery cursors.
//!
//! Implements `TransactionProvider` and `OutboxLog` with the same guarantees
//! as the PostgreSQL adapter:
//!
//! - Per-user row locks held by a unit of work until it finishes
//! - Writes staged in the unit of work and applied together on commit
//! - Sequence ids handed out under an append lock that is held until
//!   commit or rollback, so id order equals commit order
//!
//! Fail points inject storage errors at each step, which lets tests simulate
//! crashes between "published" and "cursor stored" without a database.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::foundation::{DomainError, EventEnvelope, SequenceId, Timestamp, UserId};
use crate::domain::user::User;
use crate::ports::{OutboxEntry, OutboxLog, TransactionProvider, UnitOfWork};

/// Storage step that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Begin,
    LockUser,
    SaveUser,
    AppendOutbox,
    Commit,
    FetchOutbox,
    LoadCursor,
    StoreCursor,
    PurgeOutbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailMode {
    Once,
    Always,
}

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    outbox: BTreeMap<SequenceId, OutboxEntry>,
    cursors: HashMap<String, SequenceId>,
    last_sequence: i64,
}

#[derive(Default)]
struct Inner {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
    append_lock: Arc<AsyncMutex<()>>,
    faults: Mutex<HashMap<FailPoint, FailMode>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn check(&self, point: FailPoint) -> Result<(), DomainError> {
        let mut faults = lock(&self.faults);
        match faults.get(&point).copied() {
            None => Ok(()),
            Some(mode) => {
                if mode == FailMode::Once {
                    faults.remove(&point);
                }
                Err(DomainError::database(
                    "Injected failure",
                    format!("{:?}", point),
                ))
            }
        }
    }

    fn row_lock(&self, id: UserId) -> Arc<AsyncMutex<()>> {
        lock(&self.row_locks).entry(id).or_default().clone()
    }
}

/// Shared handle to an in-memory users database.
///
/// Clones share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a user row outside any transaction.
    pub fn insert_user(&self, user: User) {
        lock(&self.inner.tables).users.insert(user.id(), user);
    }

    /// Returns the committed state of a user.
    pub fn user(&self, id: UserId) -> Option<User> {
        lock(&self.inner.tables).users.get(&id).cloned()
    }

    /// Number of committed outbox entries.
    pub fn outbox_len(&self) -> usize {
        lock(&self.inner.tables).outbox.len()
    }

    /// All committed outbox entries in sequence order.
    pub fn outbox_entries(&self) -> Vec<OutboxEntry> {
        lock(&self.inner.tables).outbox.values().cloned().collect()
    }

    /// Stored cursor for a consumer, if any.
    pub fn cursor(&self, consumer_name: &str) -> Option<SequenceId> {
        lock(&self.inner.tables).cursors.get(consumer_name).copied()
    }

    /// Appends a committed entry with arbitrary contents.
    ///
    /// Used to plant corrupt rows that no unit of work would produce.
    pub fn insert_raw_entry(&self, topic: impl Into<String>, payload: Vec<u8>) -> SequenceId {
        let mut tables = lock(&self.inner.tables);
        tables.last_sequence += 1;
        let sequence_id = SequenceId::new(tables.last_sequence);
        tables.outbox.insert(
            sequence_id,
            OutboxEntry {
                sequence_id,
                topic: topic.into(),
                payload,
                created_at: Timestamp::now(),
            },
        );
        sequence_id
    }

    /// Ids of users currently locked by open units of work.
    pub fn locked_users(&self) -> HashSet<UserId> {
        lock(&self.inner.row_locks)
            .iter()
            .filter(|(_, row)| row.try_lock().is_err())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Makes the next call reaching `point` fail with a transient error.
    pub fn fail_next(&self, point: FailPoint) {
        lock(&self.inner.faults).insert(point, FailMode::Once);
    }

    /// Makes every call reaching `point` fail until `heal` is called.
    pub fn fail_always(&self, point: FailPoint) {
        lock(&self.inner.faults).insert(point, FailMode::Always);
    }

    /// Clears every fail point.
    pub fn heal(&self) {
        lock(&self.inner.faults).clear();
    }
}

#[async_trait]
impl TransactionProvider for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DomainError> {
        self.inner.check(FailPoint::Begin)?;
        Ok(Box::new(InMemoryUnitOfWork::new(self.inner.clone())))
    }
}

/// Unit of work over an `InMemoryStore`.
///
/// Dropping it without `commit` discards staged writes and releases locks.
pub struct InMemoryUnitOfWork {
    inner: Arc<Inner>,
    row_guards: HashMap<UserId, OwnedMutexGuard<()>>,
    append_guard: Option<OwnedMutexGuard<()>>,
    staged_users: HashMap<UserId, User>,
    staged_outbox: Vec<OutboxEntry>,
}

impl InMemoryUnitOfWork {
    fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            row_guards: HashMap::new(),
            append_guard: None,
            staged_users: HashMap::new(),
            staged_outbox: Vec::new(),
        }
    }

    fn release(&mut self) {
        self.staged_users.clear();
        self.staged_outbox.clear();
        self.append_guard = None;
        self.row_guards.clear();
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn lock_user(&mut self, id: UserId) -> Result<Option<User>, DomainError> {
        self.inner.check(FailPoint::LockUser)?;

        if !self.row_guards.contains_key(&id) {
            let guard = self.inner.row_lock(id).lock_owned().await;
            self.row_guards.insert(id, guard);
        }

        if let Some(staged) = self.staged_users.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(lock(&self.inner.tables).users.get(&id).cloned())
    }

    async fn save_user(&mut self, user: &User) -> Result<(), DomainError> {
        self.inner.check(FailPoint::SaveUser)?;
        self.staged_users.insert(user.id(), user.clone());
        Ok(())
    }

    async fn append_outbox(
        &mut self,
        events: &[EventEnvelope],
    ) -> Result<Vec<SequenceId>, DomainError> {
        self.inner.check(FailPoint::AppendOutbox)?;

        if self.append_guard.is_none() {
            let guard = self.inner.append_lock.clone().lock_owned().await;
            self.append_guard = Some(guard);
        }

        let mut ids = Vec::with_capacity(events.len());
        let mut tables = lock(&self.inner.tables);
        for envelope in events {
            tables.last_sequence += 1;
            let sequence_id = SequenceId::new(tables.last_sequence);
            self.staged_outbox
                .push(OutboxEntry::from_envelope(sequence_id, envelope)?);
            ids.push(sequence_id);
        }
        Ok(ids)
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        if let Err(err) = self.inner.check(FailPoint::Commit) {
            self.release();
            return Err(err);
        }

        {
            let mut tables = lock(&self.inner.tables);
            for (id, user) in self.staged_users.drain() {
                tables.users.insert(id, user);
            }
            for entry in self.staged_outbox.drain(..) {
                tables.outbox.insert(entry.sequence_id, entry);
            }
        }

        self.release();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        self.release();
        Ok(())
    }
}

#[async_trait]
impl OutboxLog for InMemoryStore {
    async fn fetch_after(
        &self,
        after: SequenceId,
        limit: u32,
    ) -> Result<Vec<OutboxEntry>, DomainError> {
        self.inner.check(FailPoint::FetchOutbox)?;

        let tables = lock(&self.inner.tables);
        Ok(tables
            .outbox
            .range((Bound::Excluded(after), Bound::Unbounded))
            .take(limit as usize)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn load_cursor(&self, consumer_name: &str) -> Result<SequenceId, DomainError> {
        self.inner.check(FailPoint::LoadCursor)?;
        Ok(self.cursor(consumer_name).unwrap_or(SequenceId::ORIGIN))
    }

    async fn store_cursor(
        &self,
        consumer_name: &str,
        position: SequenceId,
    ) -> Result<(), DomainError> {
        self.inner.check(FailPoint::StoreCursor)?;

        let mut tables = lock(&self.inner.tables);
        let cursor = tables
            .cursors
            .entry(consumer_name.to_string())
            .or_insert(SequenceId::ORIGIN);
        if position > *cursor {
            *cursor = position;
        }
        Ok(())
    }

    async fn purge_through(&self, through: SequenceId) -> Result<u64, DomainError> {
        self.inner.check(FailPoint::PurgeOutbox)?;

        let mut tables = lock(&self.inner.tables);
        let before = tables.outbox.len();
        tables.outbox.retain(|sequence_id, _| *sequence_id > through);
        Ok((before - tables.outbox.len()) as u64)
    }

    async fn pending_count(&self, after: SequenceId) -> Result<u64, DomainError> {
        let tables = lock(&self.inner.tables);
        Ok(tables
            .outbox
            .range((Bound::Excluded(after), Bound::Unbounded))
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ErrorCode, SerializableDomainEvent};
    use crate::domain::user::PointsUsedForDiscount;
    use std::time::Duration;

    fn envelope(user: i64, points: i64) -> EventEnvelope {
        PointsUsedForDiscount::new(UserId::from_raw(user), points)
            .to_envelope()
            .unwrap()
    }

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert_user(User::unmarshal(UserId::from_raw(1), "ann@example.com", 100));
        store.insert_user(User::unmarshal(UserId::from_raw(2), "bob@example.com", 100));
        store
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible() {
        let store = store();
        let mut uow = store.begin().await.unwrap();

        let mut user = uow.lock_user(UserId::from_raw(1)).await.unwrap().unwrap();
        user.use_points(10).unwrap();
        uow.save_user(&user).await.unwrap();
        uow.append_outbox(&[envelope(1, 10)]).await.unwrap();

        assert_eq!(store.user(UserId::from_raw(1)).unwrap().points(), 100);
        assert_eq!(store.outbox_len(), 0);

        uow.commit().await.unwrap();

        assert_eq!(store.user(UserId::from_raw(1)).unwrap().points(), 90);
        assert_eq!(store.outbox_len(), 1);
    }

    #[tokio::test]
    async fn dropping_unit_of_work_discards_writes_and_locks() {
        let store = store();
        {
            let mut uow = store.begin().await.unwrap();
            let user = uow.lock_user(UserId::from_raw(1)).await.unwrap().unwrap();
            uow.save_user(&user).await.unwrap();
            uow.append_outbox(&[envelope(1, 10)]).await.unwrap();
            assert!(store.locked_users().contains(&UserId::from_raw(1)));
        }

        assert!(store.locked_users().is_empty());
        assert_eq!(store.outbox_len(), 0);
    }

    #[tokio::test]
    async fn row_lock_blocks_second_transaction() {
        let store = store();
        let mut first = store.begin().await.unwrap();
        first.lock_user(UserId::from_raw(1)).await.unwrap();

        let contender = store.clone();
        let waiting = tokio::spawn(async move {
            let mut second = contender.begin().await.unwrap();
            second.lock_user(UserId::from_raw(1)).await.unwrap();
            second.commit().await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        first.commit().await.unwrap();
        waiting.await.unwrap();
    }

    #[tokio::test]
    async fn rolled_back_ids_leave_gaps_and_order_is_kept() {
        let store = store();

        let mut aborted = store.begin().await.unwrap();
        let aborted_ids = aborted.append_outbox(&[envelope(1, 1)]).await.unwrap();
        aborted.rollback().await.unwrap();

        let mut kept = store.begin().await.unwrap();
        let kept_ids = kept
            .append_outbox(&[envelope(2, 2), envelope(2, 3)])
            .await
            .unwrap();
        kept.commit().await.unwrap();

        assert!(kept_ids[0] > aborted_ids[0]);
        assert!(kept_ids[0] < kept_ids[1]);

        let entries = store.fetch_after(SequenceId::ORIGIN, 10).await.unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.sequence_id).collect();
        assert_eq!(ids, kept_ids);
    }

    #[tokio::test]
    async fn fetch_after_respects_cursor_and_limit() {
        let store = store();
        let mut uow = store.begin().await.unwrap();
        let ids = uow
            .append_outbox(&[envelope(1, 1), envelope(1, 2), envelope(1, 3)])
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let page = store.fetch_after(ids[0], 1).await.unwrap();

        assert_eq!(page.len(), 1);
        assert_eq!(page[0].sequence_id, ids[1]);
        assert_eq!(store.pending_count(ids[0]).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn cursor_never_moves_backwards() {
        let store = store();

        store.store_cursor("fwd", SequenceId::new(5)).await.unwrap();
        store.store_cursor("fwd", SequenceId::new(3)).await.unwrap();

        assert_eq!(store.load_cursor("fwd").await.unwrap(), SequenceId::new(5));
        assert_eq!(store.load_cursor("other").await.unwrap(), SequenceId::ORIGIN);
    }

    #[tokio::test]
    async fn purge_removes_entries_through_position() {
        let store = store();
        let first = store.insert_raw_entry("t.v1", b"{}".to_vec());
        let second = store.insert_raw_entry("t.v1", b"{}".to_vec());

        assert_eq!(store.purge_through(first).await.unwrap(), 1);

        let remaining = store.outbox_entries();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].sequence_id, second);
    }

    #[tokio::test]
    async fn fail_next_fires_once() {
        let store = store();
        store.fail_next(FailPoint::StoreCursor);

        let err = store
            .store_cursor("fwd", SequenceId::new(1))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::DatabaseError);
        store.store_cursor("fwd", SequenceId::new(1)).await.unwrap();
    }

    #[tokio::test]
    async fn fail_always_persists_until_healed() {
        let store = store();
        store.fail_always(FailPoint::FetchOutbox);

        assert!(store.fetch_after(SequenceId::ORIGIN, 1).await.is_err());
        assert!(store.fetch_after(SequenceId::ORIGIN, 1).await.is_err());

        store.heal();
        assert!(store.fetch_after(SequenceId::ORIGIN, 1).await.is_ok());
    }
}

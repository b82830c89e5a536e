//! UnitOfWork port - one storage transaction spanning aggregate and outbox.
//!
//! The aggregate row and the outbox rows live in the same database, so a
//! single local transaction makes "points were spent" and "a discount event
//! must be sent" one fact. Everything the aggregate transaction does goes
//! through one `UnitOfWork`:
//!
//! 1. `lock_user` - exclusive row lock, held until commit or rollback
//! 2. `save_user` - write back the mutated fields
//! 3. `append_outbox` - one entry per event, sequence ids in commit order
//! 4. `commit` or `rollback`
//!
//! Dropping a unit of work without committing discards all of its writes.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventEnvelope, SequenceId, UserId};
use crate::domain::user::User;

/// An open storage transaction.
///
/// Implementations must guarantee:
/// - Writes become visible only on `commit`, all together
/// - `lock_user` blocks while another open unit of work holds the same user
/// - Sequence ids returned by `append_outbox` are ordered like commits: an
///   entry with a lower id is never committed after one with a higher id
#[async_trait]
pub trait UnitOfWork: Send {
    /// Loads a user and holds an exclusive lock on the row.
    ///
    /// Returns `None` if no such user exists.
    async fn lock_user(&mut self, id: UserId) -> Result<Option<User>, DomainError>;

    /// Writes the user's fields back to its row.
    async fn save_user(&mut self, user: &User) -> Result<(), DomainError>;

    /// Appends one outbox entry per event.
    ///
    /// Returns the assigned sequence ids, in the same order as `events`.
    async fn append_outbox(
        &mut self,
        events: &[EventEnvelope],
    ) -> Result<Vec<SequenceId>, DomainError>;

    /// Makes every write of this unit of work durable and releases its locks.
    async fn commit(&mut self) -> Result<(), DomainError>;

    /// Discards every write of this unit of work and releases its locks.
    async fn rollback(&mut self) -> Result<(), DomainError>;
}

/// Opens units of work against the users database.
#[async_trait]
pub trait TransactionProvider: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_of_work_is_object_safe() {
        fn _accepts_dyn(_uow: &mut dyn UnitOfWork) {}
    }

    #[test]
    fn transaction_provider_is_object_safe() {
        fn _accepts_dyn(_provider: &dyn TransactionProvider) {}
    }
}

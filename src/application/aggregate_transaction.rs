//! AggregateTransaction - mutate one user and append its events atomically.
//!
//! Every state change that other services must hear about goes through
//! `execute`. The user row is locked, mutated, written back, and the events
//! are appended to the outbox, all in one unit of work. Either everything
//! commits or nothing does.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::foundation::{DomainError, ErrorCode, EventEnvelope, SequenceId, UserId};
use crate::domain::user::User;
use crate::ports::{TransactionProvider, UnitOfWork};

/// Outcome of a committed aggregate transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    /// Outbox positions of the appended events, in emission order.
    pub sequence_ids: Vec<SequenceId>,
}

/// Runs mutations of the user aggregate inside a storage transaction.
pub struct AggregateTransaction {
    provider: Arc<dyn TransactionProvider>,
}

impl AggregateTransaction {
    pub fn new(provider: Arc<dyn TransactionProvider>) -> Self {
        Self { provider }
    }

    /// Locks `user_id`, applies `mutate`, and commits the new state together
    /// with the events `mutate` returns.
    ///
    /// The row lock is held for the whole call, so concurrent calls for the
    /// same user are serialized.
    ///
    /// # Errors
    ///
    /// - `UserNotFound` if no such user exists
    /// - Whatever `mutate` returns, unchanged
    /// - Transient storage errors (`DatabaseError`)
    ///
    /// Nothing is persisted on any error.
    pub async fn execute<F>(&self, user_id: UserId, mutate: F) -> Result<Committed, DomainError>
    where
        F: FnOnce(&mut User) -> Result<Vec<EventEnvelope>, DomainError> + Send,
    {
        let mut uow = self.provider.begin().await?;

        let sequence_ids = match Self::apply(uow.as_mut(), user_id, mutate).await {
            Ok(ids) => ids,
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(
                        user_id = %user_id,
                        error = %rollback_err,
                        "Rollback failed, transaction is discarded on drop"
                    );
                }
                return Err(err);
            }
        };

        uow.commit().await?;

        debug!(
            user_id = %user_id,
            events = sequence_ids.len(),
            "Aggregate transaction committed"
        );

        Ok(Committed { sequence_ids })
    }

    async fn apply<F>(
        uow: &mut dyn UnitOfWork,
        user_id: UserId,
        mutate: F,
    ) -> Result<Vec<SequenceId>, DomainError>
    where
        F: FnOnce(&mut User) -> Result<Vec<EventEnvelope>, DomainError> + Send,
    {
        let mut user = uow.lock_user(user_id).await?.ok_or_else(|| {
            DomainError::new(ErrorCode::UserNotFound, format!("User {} not found", user_id))
                .with_detail("user_id", user_id.to_string())
        })?;

        let events = mutate(&mut user)?;

        uow.save_user(&user).await?;

        if events.is_empty() {
            return Ok(Vec::new());
        }

        uow.append_outbox(&events).await
    }
}

//! In-memory orders database: discounts plus the applied-event ledger.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::discount::{ApplyOutcome, CustomerDiscount, DiscountGrant};
use crate::domain::foundation::{DomainError, EventId, UserId};
use crate::ports::DiscountRepository;

#[derive(Default)]
struct State {
    discounts: HashMap<UserId, CustomerDiscount>,
    applied: HashSet<EventId>,
    fail_next: bool,
}

/// In-memory implementation of `DiscountRepository`.
///
/// Counter and ledger are updated under one lock, mirroring the single local
/// transaction of the PostgreSQL adapter.
#[derive(Default)]
pub struct InMemoryDiscountRepository {
    state: Mutex<State>,
}

impl InMemoryDiscountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `apply_once` fail with a transient error, applying nothing.
    pub fn fail_next(&self) {
        self.state().fail_next = true;
    }

    /// Number of distinct events applied so far.
    pub fn applied_count(&self) -> usize {
        self.state().applied.len()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DiscountRepository for InMemoryDiscountRepository {
    async fn apply_once(&self, grant: &DiscountGrant) -> Result<ApplyOutcome, DomainError> {
        let mut state = self.state();

        if std::mem::take(&mut state.fail_next) {
            return Err(DomainError::database(
                "Failed to apply discount",
                "injected failure",
            ));
        }

        if state.applied.contains(&grant.event_id) {
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        let mut discount = state
            .discounts
            .get(&grant.user_id)
            .cloned()
            .unwrap_or_else(|| CustomerDiscount::empty(grant.user_id));
        discount.add(grant.amount)?;

        state.discounts.insert(grant.user_id, discount);
        state.applied.insert(grant.event_id.clone());

        Ok(ApplyOutcome::Applied)
    }

    async fn find(&self, user_id: UserId) -> Result<Option<CustomerDiscount>, DomainError> {
        Ok(self.state().discounts.get(&user_id).cloned())
    }
}

//! In-memory `MetricsClient` that keeps counters in a map.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::ports::MetricsClient;

#[derive(Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<String, u64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, zero if never incremented.
    pub fn get(&self, key: &str) -> u64 {
        self.counters().get(key).copied().unwrap_or(0)
    }

    /// Sorted names of every counter seen so far.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.counters().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn counters(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetricsClient for InMemoryMetrics {
    fn inc(&self, key: &str, value: u64) {
        let mut counters = self.counters();
        let counter = counters.entry(key.to_string()).or_insert(0);
        *counter = counter.saturating_add(value);
    }
}

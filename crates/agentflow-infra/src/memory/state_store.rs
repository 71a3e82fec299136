//! In-memory TTL store. Atomicity comes from `DashMap`'s per-shard entry lock.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use agentflow_core::coordination::{CoordinationError, ExecutionStateStore};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn new(value: impl Into<String>, ttl: Duration) -> Self {
        Self {
            value: value.into(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at > Instant::now()
    }
}

/// Process-local `ExecutionStateStore`.
#[derive(Default)]
pub struct InMemoryStateStore {
    entries: DashMap<String, StoredValue>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys starting with `prefix`.
    pub fn count_live(&self, prefix: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && e.value().is_live())
            .count()
    }
}

impl ExecutionStateStore for InMemoryStateStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CoordinationError> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_live() {
                    return Ok(false);
                }
                slot.insert(StoredValue::new(value, ttl));
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(StoredValue::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CoordinationError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, CoordinationError> {
        let mut slot = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StoredValue::new("0", Duration::ZERO));

        let current = if slot.is_live() {
            slot.value.parse::<i64>().map_err(|e| {
                CoordinationError::Store(format!("counter '{key}' is not an integer: {e}"))
            })?
        } else {
            0
        };
        let next = current + 1;
        *slot = StoredValue::new(next.to_string(), ttl);
        Ok(next)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CoordinationError> {
        self.entries
            .insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError> {
        Ok(self
            .entries
            .get(key)
            .filter(|e| e.is_live())
            .map(|e| e.value.clone()))
    }
}

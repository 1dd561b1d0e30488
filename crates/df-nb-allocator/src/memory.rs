//! In-process allocation authority.

use crate::authority::{AllocationAuthority, AllocationError};
use df_nb_core::{PartitionName, UniqueKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Allocation authority keeping per-partition counters in memory.
///
/// Keys start at 1 in every partition. Requests are serialized by a single
/// lock, which also serializes requests within a partition.
#[derive(Debug)]
pub struct MemoryAuthority {
    counters: Mutex<HashMap<PartitionName, u64>>,
    max_key: Option<u64>,
    available: AtomicBool,
    calls: AtomicUsize,
}

impl Default for MemoryAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuthority {
    /// Create an authority with an unbounded key space.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            max_key: None,
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    /// Bound every partition's key space to `1..=max_key`.
    #[must_use]
    pub fn with_max_key(mut self, max_key: u64) -> Self {
        self.max_key = Some(max_key);
        self
    }

    /// Mark the authority reachable or unreachable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of allocation requests received, successful or not.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Last key handed out in `partition`.
    pub async fn last_key(&self, partition: &PartitionName) -> Option<UniqueKey> {
        self.counters.lock().await.get(partition).copied().map(UniqueKey)
    }
}

impl AllocationAuthority for MemoryAuthority {
    async fn allocate_unique_key(
        &self,
        partition: &PartitionName,
    ) -> Result<UniqueKey, AllocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(AllocationError::unavailable(partition, "authority not reachable"));
        }

        let mut counters = self.counters.lock().await;
        let last = counters.get(partition).copied().unwrap_or(0);
        let next = last
            .checked_add(1)
            .filter(|next| self.max_key.map_or(true, |max| *next <= max))
            .ok_or_else(|| AllocationError::exhausted(partition))?;

        counters.insert(partition.clone(), next);
        Ok(UniqueKey(next))
    }
}

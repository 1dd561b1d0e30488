//! Bootstrap-owned authority handle.
//!
//! Process bootstrap installs the authority once it is connected and shuts
//! it down on exit. Everything that creates objects receives the slot (or an
//! `Arc` of it) rather than reaching for a global. Requests made while the
//! slot is empty fail with `Unavailable`.

use crate::authority::{AllocationAuthority, AllocationError};
use df_nb_core::{PartitionName, UniqueKey};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Replaceable handle to an allocation authority.
pub struct AuthoritySlot<A> {
    inner: RwLock<Option<Arc<A>>>,
}

impl<A> Default for AuthoritySlot<A> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<A: AllocationAuthority> AuthoritySlot<A> {
    /// Create a slot with an authority already installed.
    #[must_use]
    pub fn new(authority: A) -> Self {
        Self {
            inner: RwLock::new(Some(Arc::new(authority))),
        }
    }

    /// Install an authority, returning the one it replaced.
    pub async fn install(&self, authority: A) -> Option<Arc<A>> {
        tracing::info!("Allocation authority installed");
        self.inner.write().await.replace(Arc::new(authority))
    }

    /// Remove the authority. Later requests fail with `Unavailable`.
    ///
    /// Requests already in flight finish against the removed authority.
    pub async fn shutdown(&self) -> Option<Arc<A>> {
        tracing::info!("Allocation authority shut down");
        self.inner.write().await.take()
    }

    /// Whether an authority is installed.
    pub async fn is_installed(&self) -> bool {
        self.inner.read().await.is_some()
    }
}

impl<A> AuthoritySlot<A> {
    /// Create a slot with no authority.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }
}

impl<A: AllocationAuthority> AllocationAuthority for AuthoritySlot<A> {
    async fn allocate_unique_key(
        &self,
        partition: &PartitionName,
    ) -> Result<UniqueKey, AllocationError> {
        let authority = self.inner.read().await.clone();
        match authority {
            Some(authority) => authority.allocate_unique_key(partition).await,
            None => Err(AllocationError::unavailable(
                partition,
                "no allocation authority connected",
            )),
        }
    }
}

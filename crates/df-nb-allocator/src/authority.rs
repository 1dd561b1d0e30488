//! Allocation authority contract and the creation-time key hook.

use df_nb_core::{KeyError, KeyState, Model, PartitionName, UniqueKey};
use std::future::Future;
use std::sync::Arc;

/// An external service issuing unique keys per partition.
///
/// Implementations serialize concurrent requests for the same partition so
/// that no two callers receive the same key. Callers get no ordering
/// guarantee between requests, only uniqueness.
pub trait AllocationAuthority: Send + Sync {
    /// Allocate a fresh key in `partition`.
    ///
    /// Performs at most one request to the authority. Retrying after a
    /// failure may or may not consume a key.
    fn allocate_unique_key(
        &self,
        partition: &PartitionName,
    ) -> impl Future<Output = Result<UniqueKey, AllocationError>> + Send;
}

impl<A: AllocationAuthority> AllocationAuthority for Arc<A> {
    fn allocate_unique_key(
        &self,
        partition: &PartitionName,
    ) -> impl Future<Output = Result<UniqueKey, AllocationError>> + Send {
        (**self).allocate_unique_key(partition)
    }
}

/// Errors returned by an allocation authority.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    /// Authority unreachable, not initialized, or failed to answer
    #[error("allocation authority unavailable for partition '{partition}': {reason}")]
    Unavailable {
        /// Partition the key was requested for
        partition: String,
        /// Cause reported by the transport or backend
        reason: String,
    },
    /// Partition key space is exhausted
    #[error("key space exhausted for partition '{partition}'")]
    Exhausted {
        /// Partition the key was requested for
        partition: String,
    },
}

impl AllocationError {
    pub(crate) fn unavailable(partition: &PartitionName, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            partition: partition.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn exhausted(partition: &PartitionName) -> Self {
        Self::Exhausted {
            partition: partition.to_string(),
        }
    }

    /// Whether retrying the whole creation later may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Errors from the creation-time key hook.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    /// Object cannot be keyed (already keyed, bad partition)
    #[error(transparent)]
    Key(#[from] KeyError),
    /// Authority failed to allocate
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

impl HookError {
    /// Key state the failed hook left the object in.
    #[must_use]
    pub fn key_state(&self) -> KeyState {
        match self {
            HookError::Allocation(_) | HookError::Key(KeyError::NotAttached(_)) => {
                KeyState::CreationAborted
            }
            HookError::Key(KeyError::AlreadyKeyed(key)) => KeyState::Keyed(*key),
            HookError::Key(_) => KeyState::Unkeyed,
        }
    }
}

/// Creation-time hook: allocate and attach a unique key to `obj`.
///
/// Returns `Ok(None)` for models without the unique key capability. The
/// object must not carry a key yet; this is checked before contacting the
/// authority. On failure the object is left unkeyed and must not be
/// persisted.
///
/// # Errors
///
/// Returns error if the object is already keyed, exposes its key read-only,
/// or allocation fails.
pub async fn allocate_for<M, A>(authority: &A, obj: &mut M) -> Result<Option<UniqueKey>, HookError>
where
    M: Model,
    A: AllocationAuthority,
{
    let mut state = match obj.as_unique_key() {
        None => return Ok(None),
        Some(keyed) => keyed.key_state(),
    };
    if let Some(existing) = state.key() {
        return Err(KeyError::AlreadyKeyed(existing).into());
    }
    if obj.as_unique_key_mut().is_none() {
        return Err(KeyError::ReadOnly.into());
    }

    let partition = M::partition()?;
    let key = match authority.allocate_unique_key(&partition).await {
        Ok(key) => key,
        Err(err) => {
            state.abort()?;
            tracing::debug!(
                partition = %partition,
                id = obj.id(),
                ?state,
                error = %err,
                "Key allocation failed"
            );
            return Err(err.into());
        }
    };

    if let Some(keyed) = obj.as_unique_key_mut() {
        keyed.assign_unique_key(key)?;
    }
    if obj.assigned_key() != Some(key) {
        return Err(KeyError::NotAttached(key).into());
    }

    tracing::debug!(partition = %partition, id = obj.id(), %key, "Allocated unique key");

    Ok(Some(key))
}

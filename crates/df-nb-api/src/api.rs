//! Northbound API: object lifecycle.

use crate::publisher::UpdatePublisher;
use crate::store::{ModelStore, StoreError, StoredRecord};
use df_nb_allocator::{allocate_for, AllocationAuthority, HookError};
use df_nb_core::{next_version, EventKind, Model, ModelError, UniqueKey};
use df_nb_proto::DbUpdate;
use std::sync::Arc;

/// Northbound API over an allocation authority, a store, and a publisher.
///
/// The authority handle is injected by process bootstrap and shared; the API
/// never creates or tears it down.
pub struct NbApi<A, S, P> {
    authority: Arc<A>,
    store: S,
    publisher: P,
}

impl<A, S, P> NbApi<A, S, P>
where
    A: AllocationAuthority,
    S: ModelStore,
    P: UpdatePublisher,
{
    /// Create a new API instance.
    #[must_use]
    pub fn new(authority: Arc<A>, store: S, publisher: P) -> Self {
        Self {
            authority,
            store,
            publisher,
        }
    }

    /// The allocation authority handle.
    #[must_use]
    pub fn authority(&self) -> &Arc<A> {
        &self.authority
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The update publisher.
    #[must_use]
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Create an object.
    ///
    /// Keyed models receive their unique key here, before the first write.
    /// If allocation fails nothing is written and the error is returned; the
    /// caller may retry the whole creation later.
    ///
    /// # Errors
    ///
    /// Returns error if the object is invalid, already exists, already
    /// carries a key, allocation fails, or the write fails.
    pub async fn create<M: Model>(&self, mut obj: M) -> Result<M, ApiError> {
        obj.validate()?;

        if self.store.get(M::TABLE_NAME, obj.id())?.is_some() {
            return Err(ApiError::AlreadyExists {
                table: M::TABLE_NAME,
                id: obj.id().to_string(),
            });
        }

        let key = match allocate_for(self.authority.as_ref(), &mut obj).await {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(
                    table = M::TABLE_NAME,
                    id = obj.id(),
                    key_state = ?err.key_state(),
                    error = %err,
                    "Aborting creation"
                );
                return Err(err.into());
            }
        };

        let record = StoredRecord::from_model(&obj)?;
        if let Err(err) = self.store.insert(&record) {
            if let Some(key) = key {
                tracing::warn!(
                    table = M::TABLE_NAME,
                    id = obj.id(),
                    %key,
                    error = %err,
                    "Creation failed after allocation, unique key leaked"
                );
            }
            return Err(err.into());
        }

        tracing::info!(table = M::TABLE_NAME, id = obj.id(), key = ?key, "Object created");

        self.notify(EventKind::Created, &obj).await;
        Ok(obj)
    }

    /// Update an existing object.
    ///
    /// Never allocates. The stored unique key is carried over and the
    /// version advances by one. The write only lands if the stored version
    /// is still the one read here; a concurrent update of the same object
    /// fails with [`StoreError::Conflict`] instead of reusing the version.
    ///
    /// # Errors
    ///
    /// Returns error if the object is invalid, does not exist, carries a
    /// different unique key than stored, lost a race with another update,
    /// or the write fails.
    pub async fn update<M: Model>(&self, mut obj: M) -> Result<M, ApiError> {
        obj.validate()?;

        let existing: M = self.load(obj.id())?.ok_or_else(|| ApiError::NotFound {
            table: M::TABLE_NAME,
            id: obj.id().to_string(),
        })?;

        if let Some(stored) = existing.assigned_key() {
            match obj.assigned_key() {
                Some(given) if given != stored => {
                    return Err(ApiError::KeyMismatch {
                        table: M::TABLE_NAME,
                        id: obj.id().to_string(),
                        stored,
                        given,
                    });
                }
                Some(_) => {}
                None => {
                    if let Some(keyed) = obj.as_unique_key_mut() {
                        keyed.set_unique_key(stored);
                    }
                }
            }
        }

        let read_version = existing.current_version();
        if let Some(versioned) = obj.as_versioned_mut() {
            versioned.set_version(Some(next_version(read_version)));
        }

        self.store
            .replace(&StoredRecord::from_model(&obj)?, read_version)?;

        tracing::info!(
            table = M::TABLE_NAME,
            id = obj.id(),
            version = ?obj.current_version(),
            "Object updated"
        );

        self.notify(EventKind::Updated, &obj).await;
        Ok(obj)
    }

    /// Delete an object, returning its last stored state.
    ///
    /// # Errors
    ///
    /// Returns error if the object does not exist or the store fails.
    pub async fn delete<M: Model>(&self, id: &str) -> Result<M, ApiError> {
        let existing: M = self.load(id)?.ok_or_else(|| ApiError::NotFound {
            table: M::TABLE_NAME,
            id: id.to_string(),
        })?;

        if !self.store.delete(M::TABLE_NAME, id)? {
            return Err(ApiError::NotFound {
                table: M::TABLE_NAME,
                id: id.to_string(),
            });
        }

        tracing::info!(table = M::TABLE_NAME, id, "Object deleted");

        self.notify(EventKind::Deleted, &existing).await;
        Ok(existing)
    }

    /// Get an object by id.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails or the object cannot be decoded.
    pub fn get<M: Model>(&self, id: &str) -> Result<Option<M>, ApiError> {
        self.load(id)
    }

    /// List objects, optionally restricted to one topic.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails or an object cannot be decoded.
    pub fn list<M: Model>(&self, topic: Option<&str>) -> Result<Vec<M>, ApiError> {
        self.store
            .list(M::TABLE_NAME, topic)?
            .iter()
            .map(|record| record.to_model().map_err(ApiError::from))
            .collect()
    }

    fn load<M: Model>(&self, id: &str) -> Result<Option<M>, ApiError> {
        self.store
            .get(M::TABLE_NAME, id)?
            .map(|record| record.to_model())
            .transpose()
            .map_err(ApiError::from)
    }

    async fn notify<M: Model>(&self, action: EventKind, obj: &M) {
        if !obj.emits(action) {
            return;
        }

        let update = match DbUpdate::from_model(action, obj) {
            Ok(update) => update,
            Err(err) => {
                tracing::warn!(table = M::TABLE_NAME, id = obj.id(), error = %err, "Failed to encode update");
                return;
            }
        };

        if let Err(err) = self.publisher.publish(&update).await {
            tracing::warn!(
                table = M::TABLE_NAME,
                id = obj.id(),
                %action,
                error = %err,
                "Failed to publish update"
            );
        }
    }
}

/// Errors for API operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Object failed validation
    #[error(transparent)]
    Invalid(#[from] ModelError),
    /// Creation-time hook failed; nothing was written
    #[error("creation aborted: {0}")]
    Allocation(#[from] HookError),
    /// Store failed
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Object already exists
    #[error("{table}/{id} already exists")]
    AlreadyExists {
        /// Table name
        table: &'static str,
        /// Object id
        id: String,
    },
    /// Object does not exist
    #[error("{table}/{id} not found")]
    NotFound {
        /// Table name
        table: &'static str,
        /// Object id
        id: String,
    },
    /// Update carried a unique key other than the stored one
    #[error("{table}/{id}: unique key {given} does not match stored key {stored}")]
    KeyMismatch {
        /// Table name
        table: &'static str,
        /// Object id
        id: String,
        /// Key on record
        stored: UniqueKey,
        /// Key on the update
        given: UniqueKey,
    },
}

impl ApiError {
    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            ApiError::Allocation(HookError::Allocation(err)) => err.is_recoverable(),
            _ => false,
        }
    }
}

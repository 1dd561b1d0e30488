//! Model capabilities.
//!
//! A model is a plain serializable struct stored under a table name. Optional
//! behaviour is composed by implementing capability traits and exposing them
//! through the `as_*` accessors on [`Model`]:
//!
//! | Capability | Meaning |
//! |------------|---------|
//! | [`HasTopic`] | Pub/sub partition, indexed by the store |
//! | [`HasName`] | Human readable name |
//! | [`HasVersion`] | Optimistic update ordering |
//! | [`HasUniqueKey`] | Integer key allocated once at creation time |
//! | [`HasEvents`] | Publishes lifecycle events |

use crate::events::{EventKind, BASIC_EVENTS};
use crate::key::{KeyError, KeyState, PartitionName, UniqueKey};
use crate::version::HasVersion;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A model object stored in the northbound database.
pub trait Model: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table the model is stored in. Also the unique key partition.
    const TABLE_NAME: &'static str;

    /// Object identifier, unique within the table.
    fn id(&self) -> &str;

    /// Key partition of the model.
    ///
    /// # Errors
    ///
    /// Returns error if the table name is empty.
    fn partition() -> Result<PartitionName, KeyError> {
        PartitionName::new(Self::TABLE_NAME)
    }

    /// Topic capability.
    fn as_topic(&self) -> Option<&dyn HasTopic> {
        None
    }

    /// Name capability.
    fn as_named(&self) -> Option<&dyn HasName> {
        None
    }

    /// Version capability.
    fn as_versioned(&self) -> Option<&dyn HasVersion> {
        None
    }

    /// Mutable version capability.
    fn as_versioned_mut(&mut self) -> Option<&mut dyn HasVersion> {
        None
    }

    /// Unique key capability.
    fn as_unique_key(&self) -> Option<&dyn HasUniqueKey> {
        None
    }

    /// Mutable unique key capability.
    fn as_unique_key_mut(&mut self) -> Option<&mut dyn HasUniqueKey> {
        None
    }

    /// Lifecycle event capability.
    fn as_events(&self) -> Option<&dyn HasEvents> {
        None
    }

    /// Check the object before it is written.
    ///
    /// # Errors
    ///
    /// Returns error if the id is empty or a topic-partitioned model has an
    /// empty topic.
    fn validate(&self) -> Result<(), ModelError> {
        if self.id().is_empty() {
            return Err(ModelError::MissingId {
                table: Self::TABLE_NAME,
            });
        }
        if let Some(topic) = self.as_topic() {
            if topic.topic().is_empty() {
                return Err(ModelError::MissingTopic {
                    table: Self::TABLE_NAME,
                    id: self.id().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Topic of the object, if the model is topic-partitioned.
    fn topic_name(&self) -> Option<&str> {
        self.as_topic().map(HasTopic::topic)
    }

    /// Version of the object, if the model is versioned.
    fn current_version(&self) -> Option<u64> {
        self.as_versioned().and_then(HasVersion::version)
    }

    /// Unique key of the object, if assigned.
    fn assigned_key(&self) -> Option<UniqueKey> {
        self.as_unique_key().and_then(HasUniqueKey::unique_key)
    }

    /// Whether the model publishes the given lifecycle event.
    fn emits(&self, event: EventKind) -> bool {
        self.as_events()
            .is_some_and(|events| events.events().contains(&event))
    }
}

/// Models partitioned by a pub/sub topic.
pub trait HasTopic {
    /// The topic, required for every object.
    fn topic(&self) -> &str;
}

/// Models with a display name.
pub trait HasName {
    /// The name, if set.
    fn name(&self) -> Option<&str>;
}

/// Models carrying a unique key allocated at creation time.
pub trait HasUniqueKey {
    /// The assigned key, `None` until creation allocates one.
    fn unique_key(&self) -> Option<UniqueKey>;

    /// Store the key on the object.
    fn set_unique_key(&mut self, key: UniqueKey);

    /// Current key assignment state.
    fn key_state(&self) -> KeyState {
        KeyState::from(self.unique_key())
    }

    /// Attach a freshly allocated key.
    ///
    /// # Errors
    ///
    /// Returns error if the object already carries a key.
    fn assign_unique_key(&mut self, key: UniqueKey) -> Result<(), KeyError> {
        let mut state = self.key_state();
        state.assign(key)?;
        self.set_unique_key(key);
        Ok(())
    }
}

/// Models publishing lifecycle events.
pub trait HasEvents {
    /// Events published for this model.
    fn events(&self) -> &'static [EventKind] {
        BASIC_EVENTS
    }
}

/// Errors for invalid model objects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Object has an empty id
    #[error("{table}: object id must not be empty")]
    MissingId {
        /// Table name
        table: &'static str,
    },
    /// Topic-partitioned object has an empty topic
    #[error("{table}/{id}: topic is required")]
    MissingTopic {
        /// Table name
        table: &'static str,
        /// Object id
        id: String,
    },
}

//! Unique partition keys.
//!
//! A unique key is an integer handed out by an external allocation authority,
//! unique within one named partition (the model's table name). Objects are
//! keyed exactly once, at creation time, before their first durable write.
//!
//! ```text
//! Unkeyed --allocate ok--> Keyed (terminal for the object's lifetime)
//! Unkeyed --allocate err-> CreationAborted (terminal)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// An integer key unique within one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueKey(pub u64);

impl UniqueKey {
    /// Raw integer value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UniqueKey {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Name of a key space, usually a model's table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionName(String);

impl PartitionName {
    /// Create a partition name.
    ///
    /// # Errors
    ///
    /// Returns error if the name is empty or only whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self, KeyError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(KeyError::EmptyPartition);
        }
        Ok(Self(name))
    }

    /// The partition name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PartitionName {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PartitionName> for String {
    fn from(value: PartitionName) -> Self {
        value.0
    }
}

impl AsRef<str> for PartitionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Key assignment state of one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "key")]
pub enum KeyState {
    /// No key allocated yet
    #[default]
    Unkeyed,
    /// Key allocated and attached
    Keyed(UniqueKey),
    /// Allocation failed, the object must never be persisted
    CreationAborted,
}

impl KeyState {
    /// The attached key, if any.
    #[must_use]
    pub fn key(&self) -> Option<UniqueKey> {
        match self {
            KeyState::Keyed(key) => Some(*key),
            KeyState::Unkeyed | KeyState::CreationAborted => None,
        }
    }

    /// Attach a freshly allocated key.
    ///
    /// # Errors
    ///
    /// Returns error unless the state is `Unkeyed`.
    pub fn assign(&mut self, key: UniqueKey) -> Result<(), KeyError> {
        match self {
            KeyState::Unkeyed => {
                *self = KeyState::Keyed(key);
                Ok(())
            }
            KeyState::Keyed(existing) => Err(KeyError::AlreadyKeyed(*existing)),
            KeyState::CreationAborted => Err(KeyError::Aborted),
        }
    }

    /// Record a failed allocation.
    ///
    /// # Errors
    ///
    /// Returns error if a key was already attached.
    pub fn abort(&mut self) -> Result<(), KeyError> {
        match self {
            KeyState::Keyed(existing) => Err(KeyError::AlreadyKeyed(*existing)),
            KeyState::Unkeyed | KeyState::CreationAborted => {
                *self = KeyState::CreationAborted;
                Ok(())
            }
        }
    }
}

impl From<Option<UniqueKey>> for KeyState {
    fn from(value: Option<UniqueKey>) -> Self {
        value.map_or(KeyState::Unkeyed, KeyState::Keyed)
    }
}

/// Errors for key handling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// Partition name was empty
    #[error("partition name must not be empty")]
    EmptyPartition,
    /// Object already carries a key; allocation is creation-time only
    #[error("object already carries unique key {0}")]
    AlreadyKeyed(UniqueKey),
    /// Creation was aborted earlier and cannot be keyed
    #[error("object creation was aborted")]
    Aborted,
    /// Model exposes its key for reading but not for assignment
    #[error("unique key capability is read-only")]
    ReadOnly,
    /// Allocated key did not end up on the object
    #[error("allocated unique key {0} was not attached to the object")]
    NotAttached(UniqueKey),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_name_rejects_empty() {
        assert_eq!(PartitionName::new(""), Err(KeyError::EmptyPartition));
        assert_eq!(PartitionName::new("  "), Err(KeyError::EmptyPartition));
        assert_eq!(PartitionName::new("lport").unwrap().as_str(), "lport");
    }

    #[test]
    fn partition_name_serde_validates() {
        let name: PartitionName = serde_json::from_str("\"lswitch\"").unwrap();
        assert_eq!(name.as_str(), "lswitch");
        assert!(serde_json::from_str::<PartitionName>("\"\"").is_err());
    }

    #[test]
    fn key_state_transitions() {
        let mut state = KeyState::default();
        assert_eq!(state.key(), None);

        state.assign(UniqueKey(7)).unwrap();
        assert_eq!(state.key(), Some(UniqueKey(7)));

        assert_eq!(
            state.assign(UniqueKey(8)),
            Err(KeyError::AlreadyKeyed(UniqueKey(7)))
        );
        assert_eq!(state.abort(), Err(KeyError::AlreadyKeyed(UniqueKey(7))));
    }

    #[test]
    fn aborted_state_cannot_be_keyed() {
        let mut state = KeyState::Unkeyed;
        state.abort().unwrap();

        assert_eq!(state, KeyState::CreationAborted);
        assert_eq!(state.assign(UniqueKey(1)), Err(KeyError::Aborted));
    }
}

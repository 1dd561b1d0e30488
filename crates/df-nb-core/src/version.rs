//! Version ordering for replicated model updates.
//!
//! Every versioned model carries an optional integer version. Consumers
//! receiving an update compare it against what they already hold:
//!
//! - an absent reference always loses (nothing was observed before)
//! - otherwise the candidate must be strictly greater
//!
//! Equal versions are never newer, so two replicas echoing the same state
//! cannot overwrite each other forever.

use serde::{Deserialize, Serialize};

/// Integer version of a model object.
pub type Version = u64;

/// Decide whether `candidate` supersedes `reference`.
///
/// Returns `true` when no reference version is known, or when the candidate
/// is strictly greater.
#[must_use]
pub fn is_newer_than(candidate: Version, reference: Option<Version>) -> bool {
    match reference {
        None => true,
        Some(reference) => candidate > reference,
    }
}

/// Version a writer assigns on the next update of an object.
#[must_use]
pub fn next_version(current: Option<Version>) -> Version {
    current.map_or(0, |v| v.saturating_add(1))
}

/// Capability of models that carry a version.
pub trait HasVersion {
    /// Current version, `None` if never assigned.
    fn version(&self) -> Option<Version>;

    /// Overwrite the version.
    fn set_version(&mut self, version: Option<Version>);

    /// Whether this object supersedes `other`.
    ///
    /// An unversioned candidate never beats an existing object.
    fn is_newer_than(&self, other: Option<&dyn HasVersion>) -> bool {
        let Some(other) = other else {
            return true;
        };
        match self.version() {
            Some(candidate) => is_newer_than(candidate, other.version()),
            None => false,
        }
    }
}

/// A value paired with an optional version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedValue<T> {
    /// The stored value
    pub value: T,
    /// Version of the value, `None` if no version was observed
    pub version: Option<Version>,
}

impl<T: Clone> VersionedValue<T> {
    /// Create a versioned value.
    #[must_use]
    pub fn new(value: T, version: Version) -> Self {
        Self {
            value,
            version: Some(version),
        }
    }

    /// Create a value with no version yet.
    #[must_use]
    pub fn unversioned(value: T) -> Self {
        Self {
            value,
            version: None,
        }
    }

    /// Merge with another value, keeping whichever is newer.
    ///
    /// Returns `true` if `other` replaced the current value.
    pub fn merge(&mut self, other: &Self) -> bool {
        if other.is_newer_than(Some(&*self as &dyn HasVersion)) {
            self.value = other.value.clone();
            self.version = other.version;
            true
        } else {
            false
        }
    }
}

impl<T> HasVersion for VersionedValue<T> {
    fn version(&self) -> Option<Version> {
        self.version
    }

    fn set_version(&mut self, version: Option<Version>) {
        self.version = version;
    }
}

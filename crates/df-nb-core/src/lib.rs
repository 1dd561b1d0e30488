//! # df-nb Core
//!
//! Model building blocks for the df-nb northbound database.
//!
//! This crate provides:
//! - Version ordering for optimistic update resolution
//! - Unique partition keys and the per-object key state machine
//! - The closed set of lifecycle event names
//! - Capability traits (topic, name, version, unique key) composed by models
//! - A consumer-side replica cache that drops stale updates

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod events;
pub mod key;
pub mod model;
pub mod replica;
pub mod version;

pub use events::{EventKind, BASIC_EVENTS};
pub use key::{KeyError, KeyState, PartitionName, UniqueKey};
pub use model::{HasEvents, HasName, HasTopic, HasUniqueKey, Model, ModelError};
pub use replica::{ApplyOutcome, ReplicaCache};
pub use version::{is_newer_than, next_version, HasVersion, Version, VersionedValue};

//! # df-nb API
//!
//! Northbound object lifecycle on top of a model store, an allocation
//! authority, and an update publisher.
//!
//! ## Lifecycle
//!
//! 1. **Create**: validate, allocate the unique key, write, publish `created`
//! 2. **Update**: carry the stored key over, bump the version, write, publish `updated`
//! 3. **Delete**: remove, publish `deleted`
//!
//! A failed key allocation aborts the creation before anything is written.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod publisher;
pub mod store;

pub use api::{ApiError, NbApi};
pub use bootstrap::{
    connect_authority, connect_publisher, open_store, AnyAuthority, AnyPublisher, AnyStore,
};
pub use config::ApiConfig;
pub use publisher::{
    spawn_eventloop, BroadcastPublisher, MqttPublisher, PublishError, UpdatePublisher,
};
pub use store::{MemoryStore, ModelStore, SqliteStore, StoreError, StoredRecord};

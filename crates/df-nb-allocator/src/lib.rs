//! # df-nb Allocator
//!
//! Client side of unique key allocation.
//!
//! Every keyed model receives an integer key from an external allocation
//! authority exactly once, at creation time, before its first durable write.
//! The authority guarantees uniqueness within a partition (the model's table
//! name); this crate only asks for keys and attaches them.
//!
//! ## Authorities
//!
//! - [`MemoryAuthority`]: in-process counters, for tests and single-node use
//! - [`SqliteAuthority`]: counters persisted in a `SQLite` database
//! - [`HttpAuthority`]: remote allocation service over HTTP
//! - [`AuthoritySlot`]: bootstrap-owned handle that reports `Unavailable`
//!   until an authority is installed
//!
//! Allocation is never retried internally. A failed allocation aborts the
//! creation; a key consumed by an aborted creation is leaked.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod authority;
pub mod http;
pub mod memory;
pub mod slot;
pub mod sqlite;

pub use authority::{allocate_for, AllocationAuthority, AllocationError, HookError};
pub use http::{HttpAuthority, HttpAuthorityConfig};
pub use memory::MemoryAuthority;
pub use slot::AuthoritySlot;
pub use sqlite::SqliteAuthority;

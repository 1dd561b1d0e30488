//! # df-nb Protocol
//!
//! Wire format and pub/sub topic scheme for northbound model updates.
//!
//! ## Messages
//!
//! - `DbUpdate`: one lifecycle event (`created`, `updated`, `deleted`) of one object
//!
//! ## Topics
//!
//! Topic scheme: `df-nb/v1/{tenant}/{topic}/{table}`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod messages;
pub mod topics;

pub use messages::{DbUpdate, MessageError};
pub use topics::{TopicScheme, GLOBAL_TOPIC};

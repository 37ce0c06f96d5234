//! Wire types for the intercom bus.
//!
//! This crate contains the serde-serializable types exchanged between the
//! page, the relay and the privileged context. Everything here must survive a
//! structural copy across an isolation boundary, so payloads are plain JSON
//! values and failures travel as [`SerializedError`] rather than live error
//! objects.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization
//! * Shared: The same shapes are used by every execution context
//! * Stable: Changes only when the wire protocol changes
//!
//! Correlation, relaying and dispatch are built on top of these types in
//! `intercom-runtime` and `intercom`.

pub mod call;
pub mod error;
pub mod message;
pub mod notification;
pub mod page;

pub use call::*;
pub use error::*;
pub use message::*;
pub use notification::*;
pub use page::*;

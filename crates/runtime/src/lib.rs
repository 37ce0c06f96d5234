//! Runtime half of the intercom bus.
//!
//! Owns everything that moves messages: the [`Transport`] seam and its
//! in-memory implementation, the correlating [`Client`] used by every
//! non-privileged context, the one-to-many [`Broadcaster`] used by the
//! privileged context, and the [`LivenessController`] that keeps an
//! ephemeral privileged context awake.

pub mod broadcast;
pub mod client;
pub mod error;
pub mod fake_transport;
pub mod liveness;
pub mod transport;

pub use broadcast::Broadcaster;
pub use client::{Client, ClientOptions};
pub use error::{Error, Result};
pub use liveness::{DEFAULT_PING_INTERVAL, LivenessController, LivenessModel, LivenessState};
pub use transport::{ChannelTransport, Link, MessageReceiver, Transport, TransportParts, channel_pair};

//! Transport seam between two execution contexts.
//!
//! A transport only moves structural copies ([`JsonValue`]) in one direction;
//! inbound traffic arrives on the [`MessageReceiver`] handed out alongside it
//! in [`TransportParts`]. Senders report an unreachable peer as
//! [`Error::ChannelUnavailable`] instead of panicking or blocking.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

pub type MessageReceiver = mpsc::UnboundedReceiver<JsonValue>;

/// Outbound half of a duplex channel.
pub trait Transport: Send + Sync {
	/// Sends one structural copy to the peer context.
	fn send(&self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Both halves a context needs to talk to one peer.
pub struct TransportParts {
	pub sender: Arc<dyn Transport>,
	pub message_rx: MessageReceiver,
}

/// Shared reachability switch for an in-memory link.
///
/// Models the host unloading the peer: while suspended every send in either
/// direction fails with [`Error::ChannelUnavailable`].
#[derive(Debug, Clone, Default)]
pub struct Link {
	suspended: Arc<AtomicBool>,
}

impl Link {
	pub fn suspend(&self) {
		self.suspended.store(true, Ordering::SeqCst);
	}

	pub fn resume(&self) {
		self.suspended.store(false, Ordering::SeqCst);
	}

	pub fn is_suspended(&self) -> bool {
		self.suspended.load(Ordering::SeqCst)
	}
}

/// In-memory transport backed by an unbounded channel.
pub struct ChannelTransport {
	tx: mpsc::UnboundedSender<JsonValue>,
	link: Link,
}

impl Transport for ChannelTransport {
	fn send(&self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			if self.link.is_suspended() {
				return Err(Error::ChannelUnavailable("peer context not reachable".to_string()));
			}
			self.tx.send(message).map_err(|_| Error::ChannelUnavailable("peer context closed".to_string()))
		})
	}
}

/// Creates a connected pair of in-memory transports and their shared [`Link`].
pub fn channel_pair() -> (TransportParts, TransportParts, Link) {
	let link = Link::default();
	let (a_tx, a_rx) = mpsc::unbounded_channel();
	let (b_tx, b_rx) = mpsc::unbounded_channel();

	let a = TransportParts {
		sender: Arc::new(ChannelTransport { tx: b_tx, link: link.clone() }),
		message_rx: a_rx,
	};
	let b = TransportParts {
		sender: Arc::new(ChannelTransport { tx: a_tx, link: link.clone() }),
		message_rx: b_rx,
	};
	(a, b, link)
}

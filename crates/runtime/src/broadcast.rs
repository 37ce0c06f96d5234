//! One-to-many notification fan-out from the privileged context.

use intercom_protocol::Notification;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Notifications buffered per listener before the slowest one starts lagging.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Publish side of the notification broadcast.
///
/// Publishing is fire-and-forget: no acknowledgement, no retry, and no
/// ordering relative to in-flight requests. Publishing with nobody listening
/// is a no-op.
#[derive(Debug, Clone)]
pub struct Broadcaster {
	tx: broadcast::Sender<Value>,
}

impl Broadcaster {
	pub fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity.max(1));
		Self { tx }
	}

	/// Publishes a notification and returns how many listeners received it.
	pub fn publish(&self, notification: Notification) -> usize {
		let kind = notification.kind.clone();
		let message = match notification.into_message().and_then(|message| message.to_value()) {
			Ok(message) => message,
			Err(err) => {
				warn!(target = "intercom.broadcast", %kind, error = %err, "failed to encode notification");
				return 0;
			}
		};
		let recipients = self.publish_message(message);
		debug!(target = "intercom.broadcast", %kind, recipients, "published notification");
		recipients
	}

	/// Publishes an already-encoded Notification message.
	pub fn publish_message(&self, message: Value) -> usize {
		// send only fails when there are no receivers
		self.tx.send(message).unwrap_or(0)
	}

	/// Registers a new listener; it sees notifications published from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<Value> {
		self.tx.subscribe()
	}

	pub fn listener_count(&self) -> usize {
		self.tx.receiver_count()
	}
}

impl Default for Broadcaster {
	fn default() -> Self {
		Self::new(DEFAULT_BROADCAST_CAPACITY)
	}
}

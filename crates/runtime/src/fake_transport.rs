//! Fake transport for unit testing correlation and notification dispatch.
//!
//! Provides an in-memory peer whose side of the conversation is scripted by a
//! [`FakeTransportController`].
//!
//! # Example
//!
//! ```ignore
//! let (parts, controller) = FakeTransportBuilder::new().build();
//! let client = Client::spawn(parts, ClientOptions::default());
//!
//! let fut = client.request(json!("ping"));
//! let sent = controller.next_sent().await.unwrap();
//! controller.inject_response(sent["id"].as_u64().unwrap(), json!("pong"));
//! assert_eq!(fut.await?, json!("pong"));
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use intercom_protocol::{Message, SerializedError};
use serde_json::Value as JsonValue;
use tokio::sync::{Mutex, mpsc};

use crate::error::{Error, Result};
use crate::transport::{Link, Transport, TransportParts};

/// Builder for creating fake transport instances.
pub struct FakeTransportBuilder {
	link: Link,
}

impl FakeTransportBuilder {
	pub fn new() -> Self {
		Self { link: Link::default() }
	}

	/// Build the fake transport and return both parts and a controller.
	pub fn build(self) -> (TransportParts, FakeTransportController) {
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (sent_tx, sent_rx) = mpsc::unbounded_channel();

		let sender = FakeTransportSender {
			sent: sent_tx,
			link: self.link.clone(),
		};

		let controller = FakeTransportController {
			inbound_tx,
			sent: Mutex::new(sent_rx),
			link: self.link,
		};

		let parts = TransportParts {
			sender: Arc::new(sender),
			message_rx: inbound_rx,
		};

		(parts, controller)
	}
}

impl Default for FakeTransportBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Controller for injecting inbound traffic and inspecting sent messages.
pub struct FakeTransportController {
	inbound_tx: mpsc::UnboundedSender<JsonValue>,
	sent: Mutex<mpsc::UnboundedReceiver<JsonValue>>,
	link: Link,
}

impl FakeTransportController {
	/// Inject a raw JSON message as if the peer had sent it.
	pub fn inject(&self, message: JsonValue) {
		let _ = self.inbound_tx.send(message);
	}

	pub fn inject_response(&self, id: u64, payload: JsonValue) {
		self.inject(serde_json::json!({
			"kind": "response",
			"id": id,
			"payload": payload
		}));
	}

	pub fn inject_error(&self, id: u64, message: &str) {
		self.inject(serde_json::json!({
			"kind": "error",
			"id": id,
			"payload": SerializedError::new(message)
		}));
	}

	pub fn inject_notification(&self, payload: JsonValue) {
		self.inject(serde_json::json!({
			"kind": "notification",
			"payload": payload
		}));
	}

	/// Makes further sends fail with `ChannelUnavailable` (or succeed again).
	pub fn set_reachable(&self, reachable: bool) {
		if reachable {
			self.link.resume();
		} else {
			self.link.suspend();
		}
	}

	/// Waits for the next message sent through the fake transport.
	pub async fn next_sent(&self) -> Option<JsonValue> {
		self.sent.lock().await.recv().await
	}

	/// Waits for the next sent Request and returns its id and payload.
	pub async fn next_request(&self) -> Option<(u64, JsonValue)> {
		loop {
			let value = self.next_sent().await?;
			if let Ok(Message::Request { id, payload }) = Message::from_value(value) {
				return Some((id.0, payload));
			}
		}
	}

	/// Take all sent messages observed so far, clearing the buffer.
	pub async fn take_sent(&self) -> Vec<JsonValue> {
		let mut rx = self.sent.lock().await;
		let mut taken = Vec::new();
		while let Ok(message) = rx.try_recv() {
			taken.push(message);
		}
		taken
	}
}

struct FakeTransportSender {
	sent: mpsc::UnboundedSender<JsonValue>,
	link: Link,
}

impl Transport for FakeTransportSender {
	fn send(&self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			if self.link.is_suspended() {
				return Err(Error::ChannelUnavailable("fake peer not reachable".to_string()));
			}
			let _ = self.sent.send(message);
			Ok(())
		})
	}
}

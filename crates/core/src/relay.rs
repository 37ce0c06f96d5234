//! Relay between an untrusted page and the privileged context.
//!
//! The relay shares a window with the page but never trusts it:
//!
//! * only messages whose source is the relay's own window are considered
//! * only page Requests are forwarded, re-addressed as [`OriginTaggedRequest`]
//!   with the origin the relay observed rather than anything the page claims
//! * answers go back to the literal origin that asked, never to `*`
//! * notifications reach the page only when their kind is allow-listed
//!
//! The page correlation token never enters the bus; it stays with the task
//! handling that page request and is echoed back verbatim.

use std::sync::Arc;
use std::time::Duration;

use intercom_protocol::{Notification, NotificationKind, OriginTaggedRequest, PAGE_VISIBLE_NOTIFICATIONS, PageMessage};
use intercom_runtime::{Client, ClientOptions, DEFAULT_PING_INTERVAL, LivenessController, LivenessModel, TransportParts};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dispatcher::Dispatcher;

/// Identity of a browsing window, as the host reports it for a message source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

/// A message as delivered by the host's window messaging.
#[derive(Debug, Clone)]
pub struct PageEvent {
	pub source: WindowId,
	pub origin: String,
	pub data: Value,
}

/// A page-bound message and the origin it was addressed to.
#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
	pub target_origin: String,
	pub message: Value,
}

/// Delivery of messages back into the page.
pub trait PageSink: Send + Sync {
	fn post(&self, message: Value, target_origin: &str);
}

struct ChannelPageSink {
	tx: mpsc::UnboundedSender<PostedMessage>,
}

impl PageSink for ChannelPageSink {
	fn post(&self, message: Value, target_origin: &str) {
		let _ = self.tx.send(PostedMessage {
			target_origin: target_origin.to_string(),
			message,
		});
	}
}

/// In-memory page sink; every posted message shows up on the receiver.
pub fn page_channel() -> (Arc<dyn PageSink>, mpsc::UnboundedReceiver<PostedMessage>) {
	let (tx, rx) = mpsc::unbounded_channel();
	(Arc::new(ChannelPageSink { tx }), rx)
}

/// Opens the relay's channel to the privileged context.
pub trait Connector: Send + Sync {
	fn open_channel(&self) -> intercom_runtime::Result<TransportParts>;
}

impl Connector for Dispatcher {
	fn open_channel(&self) -> intercom_runtime::Result<TransportParts> {
		Ok(self.connect().parts)
	}
}

#[derive(Debug, Clone)]
pub struct RelayOptions {
	pub window: WindowId,
	/// Origin of the page this relay serves; notifications are posted to it.
	pub page_origin: String,
	pub forwarded: Vec<NotificationKind>,
	pub client: ClientOptions,
	pub liveness_model: LivenessModel,
	pub ping_interval: Duration,
}

impl RelayOptions {
	pub fn new(window: WindowId, page_origin: impl Into<String>) -> Self {
		Self {
			window,
			page_origin: page_origin.into(),
			forwarded: PAGE_VISIBLE_NOTIFICATIONS.to_vec(),
			client: ClientOptions::default(),
			liveness_model: LivenessModel::default(),
			ping_interval: DEFAULT_PING_INTERVAL,
		}
	}
}

/// What the relay did with one page event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
	/// Forwarded and answered (successfully or with an Error message).
	Forwarded,
	Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
	/// Sent from a window other than the relay's own.
	ForeignSource,
	Malformed,
	/// Anything but a Request, including the relay's own replies echoed back.
	NotARequest,
}

pub struct Relay {
	options: RelayOptions,
	connector: Arc<dyn Connector>,
	sink: Arc<dyn PageSink>,
	client: Mutex<Option<Arc<Client>>>,
	liveness: LivenessController,
}

impl Relay {
	/// Creates a relay. Internal notification kinds are dropped from the
	/// allow-list; only page-visible kinds can ever reach the page.
	pub fn new(mut options: RelayOptions, connector: Arc<dyn Connector>, sink: Arc<dyn PageSink>) -> Self {
		options.forwarded.retain(|kind| PAGE_VISIBLE_NOTIFICATIONS.contains(kind));
		let liveness = LivenessController::new(options.liveness_model, options.ping_interval);
		Self {
			options,
			connector,
			sink,
			client: Mutex::new(None),
			liveness,
		}
	}

	/// Connects to the privileged context and starts keep-alive pings.
	///
	/// Optional: the first forwarded request does the same lazily.
	pub fn start(&self) -> intercom_runtime::Result<()> {
		self.client().map(|_| ())
	}

	/// Returns the relay's client, creating and subscribing it on first use.
	///
	/// At most one client exists per relay, and it is subscribed exactly once.
	fn client(&self) -> intercom_runtime::Result<Arc<Client>> {
		let mut slot = self.client.lock();
		if let Some(client) = slot.as_ref() {
			return Ok(Arc::clone(client));
		}

		let parts = self.connector.open_channel()?;
		let client = Client::spawn(parts, self.options.client.clone());
		client.subscribe(self.notification_filter());
		self.liveness.start(&client);
		debug!(target = "intercom.relay", window = self.options.window.0, "relay client created");

		*slot = Some(Arc::clone(&client));
		Ok(client)
	}

	fn notification_filter(&self) -> impl Fn(&Value) + Send + Sync + 'static {
		let sink = Arc::clone(&self.sink);
		let forwarded = self.options.forwarded.clone();
		let page_origin = self.options.page_origin.clone();

		move |payload: &Value| {
			let Some(notification) = Notification::from_payload(payload) else {
				debug!(target = "intercom.relay", "dropping untyped notification");
				return;
			};
			if !forwarded.contains(&notification.kind) {
				debug!(target = "intercom.relay", kind = %notification.kind, "notification kept internal");
				return;
			}
			match (PageMessage::Notification { payload: payload.clone() }).to_value() {
				Ok(message) => sink.post(message, &page_origin),
				Err(err) => warn!(target = "intercom.relay", error = %err, "failed to encode page notification"),
			}
		}
	}

	/// Handles one page event to completion.
	pub async fn handle(&self, event: PageEvent) -> Disposition {
		if event.source != self.options.window {
			debug!(target = "intercom.relay", source = event.source.0, "ignoring message from foreign window");
			return Disposition::Ignored(IgnoreReason::ForeignSource);
		}

		let message = match PageMessage::from_value(event.data) {
			Ok(message) => message,
			Err(err) => {
				debug!(target = "intercom.relay", error = %err, "ignoring malformed page message");
				return Disposition::Ignored(IgnoreReason::Malformed);
			}
		};
		let PageMessage::Request { correlation_token, payload } = message else {
			return Disposition::Ignored(IgnoreReason::NotARequest);
		};

		let reply = match self.forward(&event.origin, payload).await {
			Ok(payload) => PageMessage::Response { correlation_token, payload },
			Err(err) => {
				debug!(target = "intercom.relay", origin = %event.origin, error = %err, "page request failed");
				PageMessage::Error {
					correlation_token,
					payload: err.to_serialized(),
				}
			}
		};

		match reply.to_value() {
			Ok(message) => self.sink.post(message, &event.origin),
			Err(err) => warn!(target = "intercom.relay", error = %err, "failed to encode page reply"),
		}
		Disposition::Forwarded
	}

	async fn forward(&self, origin: &str, call: Value) -> intercom_runtime::Result<Value> {
		let client = self.client()?;
		let request = serde_json::to_value(OriginTaggedRequest {
			origin: origin.to_string(),
			call,
		})?;
		client.request(request).await
	}

	/// Handles page events until the page channel closes, then shuts down.
	///
	/// Each event runs in its own task so a slow request never holds up the
	/// next one.
	pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<PageEvent>) {
		while let Some(event) = events.recv().await {
			let relay = Arc::clone(&self);
			tokio::spawn(async move {
				relay.handle(event).await;
			});
		}
		debug!(target = "intercom.relay", window = self.options.window.0, "page channel closed");
		self.shutdown();
	}

	/// Stops keep-alive and rejects every outstanding request.
	///
	/// The client is closed, not replaced: requests after shutdown fail.
	pub fn shutdown(&self) {
		self.liveness.stop();
		if let Some(client) = self.client.lock().as_ref() {
			client.close();
		}
	}

	/// Requests awaiting an answer, keep-alive pings included.
	pub fn pending_requests(&self) -> usize {
		self.client.lock().as_ref().map_or(0, |client| client.pending_count())
	}

	pub fn liveness(&self) -> &LivenessController {
		&self.liveness
	}

	pub fn options(&self) -> &RelayOptions {
		&self.options
	}
}

impl Drop for Relay {
	fn drop(&mut self) {
		self.shutdown();
	}
}

//! Correlating request/notification client.
//!
//! One client lives in every non-privileged context and multiplexes any
//! number of concurrent requests over a single duplex channel that has no
//! correlation of its own.
//!
//! # Message Flow
//!
//! 1. Caller invokes [`Client::request`] with an opaque payload
//! 2. Client allocates the next correlation id and parks a oneshot sender
//! 3. The Request is encoded and handed to the transport
//! 4. The inbound loop receives Response/Error messages from the peer
//! 5. Each is matched by id, removed from the pending map and settled
//! 6. Notifications bypass the pending map and go to every subscriber
//!
//! Stale or duplicate responses (no pending entry) are dropped. Closing the
//! client rejects everything still pending with [`Error::ClientClosed`].

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use intercom_protocol::{CorrelationId, Message};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::transport::{MessageReceiver, Transport, TransportParts};

/// Callback invoked for every inbound notification payload.
pub type NotificationHandler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
	/// Upper bound on how long a single request may stay pending.
	pub request_timeout: Option<Duration>,
}

struct PendingRequest {
	created_at: Instant,
	tx: oneshot::Sender<Result<Value>>,
}

type PendingMap = Mutex<HashMap<CorrelationId, PendingRequest>>;

/// Removes a pending entry when its request future goes away early.
struct PendingGuard<'a> {
	pending: &'a PendingMap,
	id: CorrelationId,
}

impl Drop for PendingGuard<'_> {
	fn drop(&mut self) {
		self.pending.lock().remove(&self.id);
	}
}

pub struct Client {
	last_id: AtomicU64,
	pending: PendingMap,
	handlers: Mutex<Vec<NotificationHandler>>,
	sender: Arc<dyn Transport>,
	closed: AtomicBool,
	options: ClientOptions,
	inbound_task: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
	/// Creates a client that sends through `sender`.
	///
	/// Inbound messages must be fed through [`Client::dispatch`]; use
	/// [`Client::spawn`] to have the client drive its own inbound loop.
	pub fn new(sender: Arc<dyn Transport>, options: ClientOptions) -> Self {
		Self {
			last_id: AtomicU64::new(0),
			pending: Mutex::new(HashMap::new()),
			handlers: Mutex::new(Vec::new()),
			sender,
			closed: AtomicBool::new(false),
			options,
			inbound_task: Mutex::new(None),
		}
	}

	/// Creates a client and spawns its inbound dispatch loop.
	///
	/// The loop only holds a weak reference, so dropping the last handle
	/// closes the client and stops the loop.
	pub fn spawn(parts: TransportParts, options: ClientOptions) -> Arc<Self> {
		let client = Arc::new(Self::new(parts.sender, options));
		let handle = tokio::spawn(run_inbound(Arc::downgrade(&client), parts.message_rx));
		*client.inbound_task.lock() = Some(handle);
		client
	}

	/// Sends `payload` as a Request and waits for the matching Response or Error.
	///
	/// A send the transport cannot accept rejects this request only, with
	/// [`Error::ChannelUnavailable`]. A remote Error rejects with
	/// [`Error::Remote`] carrying the reconstructed message.
	pub async fn request(&self, payload: Value) -> Result<Value> {
		if self.is_closed() {
			return Err(Error::ClientClosed);
		}

		let id = CorrelationId(self.last_id.fetch_add(1, Ordering::SeqCst) + 1);
		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(
			id,
			PendingRequest {
				created_at: Instant::now(),
				tx,
			},
		);
		let _guard = PendingGuard { pending: &self.pending, id };

		// close() may have drained the map between the check above and the insert
		if self.is_closed() {
			return Err(Error::ClientClosed);
		}

		let message = Message::Request { id, payload }.to_value()?;
		if let Err(err) = self.sender.send(message).await {
			debug!(target = "intercom.client", %id, error = %err, "request send failed");
			return Err(err);
		}
		trace!(target = "intercom.client", %id, "request sent");

		let settled = match self.options.request_timeout {
			Some(limit) => match tokio::time::timeout(limit, rx).await {
				Ok(settled) => settled,
				Err(_) => {
					debug!(target = "intercom.client", %id, timeout_ms = limit.as_millis() as u64, "request timed out");
					return Err(Error::Timeout(limit));
				}
			},
			None => rx.await,
		};

		settled.map_err(|_| Error::ClientClosed).and_then(|result| result)
	}

	/// Registers a callback for every inbound notification.
	///
	/// Handlers stay registered for the lifetime of the client.
	pub fn subscribe<F>(&self, handler: F)
	where
		F: Fn(&Value) + Send + Sync + 'static,
	{
		self.handlers.lock().push(Arc::new(handler));
	}

	/// Dispatches one inbound structural copy.
	///
	/// Never fails: malformed, stale and misdirected messages are logged and
	/// dropped so they cannot disturb unrelated requests.
	pub fn dispatch(&self, value: Value) {
		let message = match Message::from_value(value) {
			Ok(message) => message,
			Err(err) => {
				debug!(target = "intercom.client", error = %err, "dropping malformed message");
				return;
			}
		};

		match message {
			Message::Response { id, payload } => self.settle(id, Ok(payload)),
			Message::Error { id, payload } => self.settle(id, Err(Error::Remote(payload.into_remote()))),
			Message::Notification { payload } => self.notify(&payload),
			Message::Request { id, .. } => {
				debug!(target = "intercom.client", %id, "ignoring request addressed to a client");
			}
		}
	}

	fn settle(&self, id: CorrelationId, outcome: Result<Value>) {
		let Some(entry) = self.pending.lock().remove(&id) else {
			debug!(target = "intercom.client", %id, "dropping stale response");
			return;
		};
		trace!(
			target = "intercom.client",
			%id,
			ok = outcome.is_ok(),
			elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
			"request settled"
		);
		// receiver may already be gone (timed out or dropped)
		let _ = entry.tx.send(outcome);
	}

	fn notify(&self, payload: &Value) {
		// snapshot so handlers may subscribe re-entrantly
		let handlers: Vec<NotificationHandler> = self.handlers.lock().clone();
		for (index, handler) in handlers.iter().enumerate() {
			if panic::catch_unwind(AssertUnwindSafe(|| handler(payload))).is_err() {
				warn!(target = "intercom.client", handler = index, "notification handler panicked");
			}
		}
	}

	/// Rejects every pending request with [`Error::ClientClosed`] and refuses new ones.
	///
	/// Idempotent.
	pub fn close(&self) {
		self.fail_pending(|| Error::ClientClosed);
		if let Some(handle) = self.inbound_task.lock().take() {
			handle.abort();
		}
	}

	fn fail_pending(&self, reason: impl Fn() -> Error) {
		self.closed.store(true, Ordering::SeqCst);
		let drained: Vec<PendingRequest> = self.pending.lock().drain().map(|(_, entry)| entry).collect();
		if !drained.is_empty() {
			debug!(target = "intercom.client", rejected = drained.len(), "rejecting pending requests");
		}
		for entry in drained {
			let _ = entry.tx.send(Err(reason()));
		}
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Number of requests currently awaiting an answer.
	pub fn pending_count(&self) -> usize {
		self.pending.lock().len()
	}

	pub fn subscriber_count(&self) -> usize {
		self.handlers.lock().len()
	}
}

impl Drop for Client {
	fn drop(&mut self) {
		self.close();
	}
}

async fn run_inbound(client: Weak<Client>, mut message_rx: MessageReceiver) {
	while let Some(value) = message_rx.recv().await {
		let Some(client) = client.upgrade() else {
			return;
		};
		client.dispatch(value);
	}

	debug!(target = "intercom.client", "inbound channel closed");
	if let Some(client) = client.upgrade() {
		client.fail_pending(|| Error::ChannelUnavailable("inbound channel closed".to_string()));
	}
}

//! Privileged-context entry point.
//!
//! Every relay connection is served by its own task. Requests are answered
//! concurrently, each in a task of its own, so a slow capability never
//! delays other requests or the wakeup fast path. Notifications are
//! published once on the [`Broadcaster`] and fanned out to every connection.

use std::sync::Arc;

use intercom_protocol::{CapabilityCall, CorrelationId, Message, Notification, PrivilegedRequest, SerializedError};
use intercom_runtime::{Broadcaster, Link, Transport, TransportParts, channel_pair};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, trace, warn};

use crate::capability::{CapabilityRegistry, serialize_failure};

/// Relay-side half of a connection to the privileged context.
pub struct PrivilegedConnection {
	pub parts: TransportParts,
	pub link: Link,
}

/// A served connection: its reachability switch and the task serving it.
struct Served {
	link: Link,
	task: JoinHandle<()>,
}

pub struct Dispatcher {
	registry: Arc<CapabilityRegistry>,
	broadcaster: Broadcaster,
	connections: Mutex<Vec<Served>>,
}

impl Dispatcher {
	pub fn new(registry: CapabilityRegistry) -> Arc<Self> {
		Arc::new(Self {
			registry: Arc::new(registry),
			broadcaster: Broadcaster::default(),
			connections: Mutex::new(Vec::new()),
		})
	}

	/// Opens a new duplex connection and starts serving its privileged end.
	pub fn connect(&self) -> PrivilegedConnection {
		let (relay_end, privileged_end, link) = channel_pair();
		let notifications = self.broadcaster.subscribe();
		let task = tokio::spawn(serve(Arc::clone(&self.registry), privileged_end, notifications));

		let mut connections = self.connections.lock();
		connections.retain(|served| !served.task.is_finished());
		connections.push(Served { link: link.clone(), task });
		drop(connections);

		debug!(target = "intercom.dispatcher", listeners = self.broadcaster.listener_count(), "relay connected");
		PrivilegedConnection { parts: relay_end, link }
	}

	/// Broadcasts a state change to every connected relay.
	///
	/// Fire-and-forget; with no relay connected this does nothing.
	pub fn notify(&self, notification: Notification) -> usize {
		self.broadcaster.publish(notification)
	}

	pub fn broadcaster(&self) -> &Broadcaster {
		&self.broadcaster
	}

	/// Simulates the host unloading the privileged context: all sends fail.
	pub fn suspend(&self) {
		for served in self.connections.lock().iter() {
			served.link.suspend();
		}
		debug!(target = "intercom.dispatcher", "privileged context suspended");
	}

	pub fn resume(&self) {
		for served in self.connections.lock().iter() {
			served.link.resume();
		}
		debug!(target = "intercom.dispatcher", "privileged context resumed");
	}

	/// Connections still being served. Finished ones are forgotten.
	pub fn connection_count(&self) -> usize {
		let mut connections = self.connections.lock();
		connections.retain(|served| !served.task.is_finished());
		connections.len()
	}

	/// Stops serving every connection.
	pub fn shutdown(&self) {
		for served in self.connections.lock().drain(..) {
			served.task.abort();
		}
	}
}

impl Drop for Dispatcher {
	fn drop(&mut self) {
		self.shutdown();
	}
}

async fn serve(registry: Arc<CapabilityRegistry>, parts: TransportParts, mut notifications: broadcast::Receiver<Value>) {
	let TransportParts { sender, mut message_rx } = parts;
	let mut in_flight = JoinSet::new();
	let mut broadcasting = true;

	loop {
		tokio::select! {
			inbound = message_rx.recv() => {
				let Some(value) = inbound else {
					debug!(target = "intercom.dispatcher", "relay disconnected");
					break;
				};
				handle_inbound(&registry, value, &sender, &mut in_flight).await;
			}
			notice = notifications.recv(), if broadcasting => match notice {
				Ok(message) => {
					if let Err(err) = sender.send(message).await {
						debug!(target = "intercom.dispatcher", error = %err, "notification not delivered");
					}
				}
				Err(RecvError::Lagged(skipped)) => {
					warn!(target = "intercom.dispatcher", skipped, "relay lagging behind notifications");
				}
				Err(RecvError::Closed) => broadcasting = false,
			},
			Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
		}
	}
}

async fn handle_inbound(registry: &CapabilityRegistry, value: Value, sender: &Arc<dyn Transport>, in_flight: &mut JoinSet<()>) {
	let (id, payload) = match Message::from_value(value) {
		Ok(Message::Request { id, payload }) => (id, payload),
		Ok(other) => {
			debug!(target = "intercom.dispatcher", kind = ?other.kind(), "ignoring non-request message");
			return;
		}
		Err(err) => {
			debug!(target = "intercom.dispatcher", error = %err, "dropping malformed message");
			return;
		}
	};

	let (origin, call) = match PrivilegedRequest::from_payload(payload) {
		Some(PrivilegedRequest::Direct(call)) if call.is_wakeup() => {
			trace!(target = "intercom.dispatcher", %id, "wakeup");
			reply(sender.as_ref(), id, Ok(Value::Null)).await;
			return;
		}
		Some(PrivilegedRequest::Direct(call)) => (None, call),
		Some(PrivilegedRequest::Relayed(request)) => match serde_json::from_value::<CapabilityCall>(request.call) {
			Ok(call) => (Some(request.origin), call),
			Err(_) => {
				reply(sender.as_ref(), id, Err(SerializedError::new("malformed request"))).await;
				return;
			}
		},
		None => {
			reply(sender.as_ref(), id, Err(SerializedError::new("malformed request"))).await;
			return;
		}
	};

	let Some(capability) = registry.get(&call.method) else {
		debug!(target = "intercom.dispatcher", %id, method = %call.method, "unsupported method");
		reply(sender.as_ref(), id, Err(SerializedError::new(format!("unsupported method: {}", call.method)))).await;
		return;
	};

	let sender = Arc::clone(sender);
	in_flight.spawn(async move {
		let outcome = capability.invoke(origin.as_deref(), call.params).await;
		let outcome = outcome.map_err(|err| {
			debug!(target = "intercom.dispatcher", %id, method = %call.method, error = %err, "capability failed");
			serialize_failure(&err)
		});
		reply(sender.as_ref(), id, outcome).await;
	});
}

async fn reply(sender: &dyn Transport, id: CorrelationId, outcome: Result<Value, SerializedError>) {
	let message = match outcome {
		Ok(payload) => Message::Response { id, payload },
		Err(payload) => Message::Error { id, payload },
	};
	let value = match message.to_value() {
		Ok(value) => value,
		Err(err) => {
			warn!(target = "intercom.dispatcher", %id, error = %err, "failed to encode reply");
			return;
		}
	};
	if let Err(err) = sender.send(value).await {
		debug!(target = "intercom.dispatcher", %id, error = %err, "reply not delivered");
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use anyhow::anyhow;
	use intercom_protocol::{NotificationKind, OriginTaggedRequest};
	use intercom_runtime::{Client, ClientOptions};
	use serde_json::json;

	use super::*;

	fn registry() -> CapabilityRegistry {
		let mut registry = CapabilityRegistry::new();
		registry
			.register_fn("echo", |origin, params| async move { Ok(json!({"origin": origin, "params": params})) })
			.register_fn("signTransaction", |_, _| async { Err(anyhow!("insufficient funds")) })
			.register_fn("slow", |_, _| async {
				tokio::time::sleep(Duration::from_secs(3600)).await;
				Ok(Value::Null)
			});
		registry
	}

	fn relayed(origin: &str, call: Value) -> Value {
		serde_json::to_value(OriginTaggedRequest {
			origin: origin.to_string(),
			call,
		})
		.unwrap()
	}

	#[tokio::test]
	async fn relayed_request_reaches_capability_with_origin() {
		let dispatcher = Dispatcher::new(registry());
		let client = Client::spawn(dispatcher.connect().parts, ClientOptions::default());

		let result = client.request(relayed("https://dapp.example", json!({"method": "echo", "params": [1]}))).await.unwrap();
		assert_eq!(result, json!({"origin": "https://dapp.example", "params": [1]}));
	}

	#[tokio::test]
	async fn direct_call_has_no_origin() {
		let dispatcher = Dispatcher::new(registry());
		let client = Client::spawn(dispatcher.connect().parts, ClientOptions::default());

		let result = client.request(json!({"method": "echo"})).await.unwrap();
		assert_eq!(result, json!({"origin": null, "params": null}));
	}

	#[tokio::test]
	async fn capability_failure_becomes_remote_error() {
		let dispatcher = Dispatcher::new(registry());
		let client = Client::spawn(dispatcher.connect().parts, ClientOptions::default());

		let err = client.request(relayed("https://dapp.example", json!({"method": "signTransaction"}))).await.unwrap_err();
		assert!(err.is_remote());
		assert_eq!(err.to_string(), "insufficient funds");
	}

	#[tokio::test]
	async fn unknown_and_malformed_requests_get_error_replies() {
		let dispatcher = Dispatcher::new(registry());
		let client = Client::spawn(dispatcher.connect().parts, ClientOptions::default());

		let err = client.request(json!({"method": "exportSeed"})).await.unwrap_err();
		assert_eq!(err.to_string(), "unsupported method: exportSeed");

		let err = client.request(json!("ping")).await.unwrap_err();
		assert_eq!(err.to_string(), "malformed request");

		let err = client.request(relayed("https://dapp.example", json!(42))).await.unwrap_err();
		assert_eq!(err.to_string(), "malformed request");
	}

	#[tokio::test(start_paused = true)]
	async fn wakeup_is_answered_while_capabilities_are_busy() {
		let dispatcher = Dispatcher::new(registry());
		let client = Client::spawn(dispatcher.connect().parts, ClientOptions::default());

		let busy = tokio::spawn({
			let client = Arc::clone(&client);
			async move { client.request(json!({"method": "slow"})).await }
		});

		let wakeup = serde_json::to_value(CapabilityCall::wakeup()).unwrap();
		let answered = tokio::time::timeout(Duration::from_secs(1), client.request(wakeup)).await;
		assert_eq!(answered.unwrap().unwrap(), Value::Null);
		assert!(!busy.is_finished());
	}

	#[tokio::test]
	async fn notify_without_relays_is_a_no_op() {
		let dispatcher = Dispatcher::new(registry());
		assert_eq!(dispatcher.notify(Notification::new(NotificationKind::NetworkChanged, json!({"chainId": "mainnet"}))), 0);
	}

	#[tokio::test]
	async fn notify_reaches_every_connected_client() {
		let dispatcher = Dispatcher::new(registry());
		let first = Client::spawn(dispatcher.connect().parts, ClientOptions::default());
		let second = Client::spawn(dispatcher.connect().parts, ClientOptions::default());

		let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
		for client in [&first, &second] {
			let tx = tx.clone();
			client.subscribe(move |payload| {
				let _ = tx.send(payload.clone());
			});
		}

		assert_eq!(dispatcher.notify(Notification::new(NotificationKind::AccountRemoved, json!({"address": "addr1"}))), 2);
		for _ in 0..2 {
			let payload = rx.recv().await.unwrap();
			assert_eq!(payload["kind"], "account-removed");
		}
	}

	#[tokio::test]
	async fn finished_connections_are_forgotten() {
		let dispatcher = Dispatcher::new(registry());
		let kept = Client::spawn(dispatcher.connect().parts, ClientOptions::default());
		let dropped = Client::spawn(dispatcher.connect().parts, ClientOptions::default());
		assert_eq!(dispatcher.connection_count(), 2);

		drop(dropped);
		tokio::time::timeout(Duration::from_secs(5), async {
			while dispatcher.connection_count() != 1 {
				tokio::task::yield_now().await;
			}
		})
		.await
		.unwrap();

		let _third = Client::spawn(dispatcher.connect().parts, ClientOptions::default());
		assert_eq!(dispatcher.connection_count(), 2);
		assert!(kept.request(json!({"method": "echo"})).await.is_ok());
	}

	#[tokio::test]
	async fn suspended_context_rejects_sends() {
		let dispatcher = Dispatcher::new(registry());
		let client = Client::spawn(dispatcher.connect().parts, ClientOptions::default());

		dispatcher.suspend();
		assert!(client.request(json!({"method": "echo"})).await.unwrap_err().is_unavailable());

		dispatcher.resume();
		assert!(client.request(json!({"method": "echo"})).await.is_ok());
	}
}

//! Keep-alive pings toward an ephemeral privileged context.
//!
//! Hosts that unload an idle privileged context reset their idle clock on
//! any inbound message. The controller sends a wakeup request through the
//! context's [`Client`] at a fixed interval; the answer is discarded and
//! every failure is swallowed, so an unreachable or restarting privileged
//! context is never visible to callers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use intercom_protocol::CapabilityCall;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::client::Client;

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(10);

/// How the host treats an idle privileged context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LivenessModel {
	/// Legacy persistent background; never unloaded, no pings needed.
	Persistent,
	/// Unloaded when idle; pings required.
	#[default]
	Ephemeral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
	Dormant,
	Active,
}

pub struct LivenessController {
	model: LivenessModel,
	interval: Duration,
	task: Mutex<Option<JoinHandle<()>>>,
	started: Mutex<bool>,
	pings: Arc<AtomicU64>,
}

impl LivenessController {
	pub fn new(model: LivenessModel, interval: Duration) -> Self {
		Self {
			model,
			interval,
			task: Mutex::new(None),
			started: Mutex::new(false),
			pings: Arc::new(AtomicU64::new(0)),
		}
	}

	/// Moves Dormant→Active when the host model requires pings.
	///
	/// Happens at most once per controller; later calls, and every call under
	/// [`LivenessModel::Persistent`], leave the state unchanged.
	pub fn start(&self, client: &Arc<Client>) -> LivenessState {
		let mut started = self.started.lock();
		if *started || self.model == LivenessModel::Persistent {
			return self.state();
		}
		*started = true;

		debug!(target = "intercom.liveness", interval_ms = self.interval.as_millis() as u64, "keep-alive started");
		let handle = tokio::spawn(run_pings(Arc::downgrade(client), self.interval, Arc::clone(&self.pings)));
		*self.task.lock() = Some(handle);
		LivenessState::Active
	}

	/// Cancels the ping timer. Idempotent; safe on every exit path.
	pub fn stop(&self) {
		if let Some(handle) = self.task.lock().take() {
			handle.abort();
			debug!(target = "intercom.liveness", "keep-alive stopped");
		}
	}

	pub fn state(&self) -> LivenessState {
		match self.task.lock().as_ref() {
			Some(task) if !task.is_finished() => LivenessState::Active,
			_ => LivenessState::Dormant,
		}
	}

	pub fn model(&self) -> LivenessModel {
		self.model
	}

	/// Pings fired so far, whatever their outcome.
	pub fn pings_sent(&self) -> u64 {
		self.pings.load(Ordering::SeqCst)
	}
}

impl Drop for LivenessController {
	fn drop(&mut self) {
		self.stop();
	}
}

async fn run_pings(client: Weak<Client>, interval: Duration, pings: Arc<AtomicU64>) {
	let mut ticker = time::interval_at(Instant::now() + interval, interval);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
	// dropped with this task, which aborts any ping still in flight
	let mut in_flight = JoinSet::new();

	loop {
		tokio::select! {
			_ = ticker.tick() => {
				let Some(client) = client.upgrade().filter(|client| !client.is_closed()) else {
					debug!(target = "intercom.liveness", "client gone or closed; keep-alive exiting");
					return;
				};
				pings.fetch_add(1, Ordering::SeqCst);
				in_flight.spawn(ping(client, interval));
			}
			Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
		}
	}
}

async fn ping(client: Arc<Client>, limit: Duration) {
	let payload = match serde_json::to_value(CapabilityCall::wakeup()) {
		Ok(payload) => payload,
		Err(err) => {
			debug!(target = "intercom.liveness", error = %err, "failed to encode wakeup");
			return;
		}
	};

	match time::timeout(limit, client.request(payload)).await {
		Ok(Ok(_)) => trace!(target = "intercom.liveness", "wakeup acknowledged"),
		Ok(Err(err)) => debug!(target = "intercom.liveness", error = %err, "wakeup failed; ignoring"),
		Err(_) => debug!(target = "intercom.liveness", "wakeup unanswered; ignoring"),
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::client::ClientOptions;
	use crate::fake_transport::FakeTransportBuilder;

	#[tokio::test]
	async fn persistent_model_stays_dormant() {
		let (parts, _controller) = FakeTransportBuilder::new().build();
		let client = Client::spawn(parts, ClientOptions::default());
		let liveness = LivenessController::new(LivenessModel::Persistent, DEFAULT_PING_INTERVAL);

		assert_eq!(liveness.start(&client), LivenessState::Dormant);
		assert_eq!(liveness.state(), LivenessState::Dormant);
	}

	#[tokio::test(start_paused = true)]
	async fn active_controller_pings_on_interval() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let client = Client::spawn(parts, ClientOptions::default());
		let liveness = LivenessController::new(LivenessModel::Ephemeral, Duration::from_secs(10));

		assert_eq!(liveness.start(&client), LivenessState::Active);
		assert_eq!(liveness.pings_sent(), 0);

		let (id, payload) = controller.next_request().await.unwrap();
		assert_eq!(payload["method"], intercom_protocol::WAKEUP_METHOD);
		controller.inject_response(id, json!(null));

		controller.next_request().await.unwrap();
		assert_eq!(liveness.pings_sent(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn failed_ping_is_swallowed_and_schedule_continues() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let client = Client::spawn(parts, ClientOptions::default());
		let liveness = LivenessController::new(LivenessModel::Ephemeral, Duration::from_secs(10));
		liveness.start(&client);

		let caller = tokio::spawn({
			let client = Arc::clone(&client);
			async move { client.request(json!({"method": "getAccounts"})).await }
		});
		let (caller_id, _) = controller.next_request().await.unwrap();

		controller.set_reachable(false);
		time::sleep(Duration::from_secs(11)).await;
		assert_eq!(liveness.pings_sent(), 1);

		controller.set_reachable(true);
		let started = Instant::now();
		let (_, payload) = controller.next_request().await.unwrap();
		assert_eq!(payload["method"], intercom_protocol::WAKEUP_METHOD);
		assert_eq!(liveness.pings_sent(), 2);
		assert!(started.elapsed() <= Duration::from_secs(10));

		controller.inject_response(caller_id, json!(["addr1"]));
		assert_eq!(caller.await.unwrap().unwrap(), json!(["addr1"]));
	}

	#[tokio::test(start_paused = true)]
	async fn unanswered_ping_does_not_accumulate_pending_entries() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let client = Client::spawn(parts, ClientOptions::default());
		let liveness = LivenessController::new(LivenessModel::Ephemeral, Duration::from_secs(10));
		liveness.start(&client);

		for _ in 0..3 {
			controller.next_request().await.unwrap();
		}
		// t=45s: the third ping has expired, the fourth is still waiting
		time::sleep(Duration::from_secs(15)).await;
		assert_eq!(liveness.pings_sent(), 4);
		assert_eq!(client.pending_count(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn stop_is_idempotent_and_halts_pings() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let client = Client::spawn(parts, ClientOptions::default());
		let liveness = LivenessController::new(LivenessModel::Ephemeral, Duration::from_secs(10));
		liveness.start(&client);

		controller.next_request().await.unwrap();
		liveness.stop();
		liveness.stop();
		assert_eq!(liveness.state(), LivenessState::Dormant);

		time::sleep(Duration::from_secs(60)).await;
		assert_eq!(liveness.pings_sent(), 1);
		assert!(controller.take_sent().await.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn keep_alive_ends_when_the_inbound_channel_closes() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let client = Client::spawn(parts, ClientOptions::default());
		let liveness = LivenessController::new(LivenessModel::Ephemeral, Duration::from_secs(10));
		liveness.start(&client);

		drop(controller);
		time::sleep(Duration::from_secs(1)).await;
		assert!(client.is_closed());

		time::sleep(Duration::from_secs(35)).await;
		assert_eq!(liveness.pings_sent(), 0);
		assert_eq!(liveness.state(), LivenessState::Dormant);
	}

	#[tokio::test]
	async fn start_happens_only_once() {
		let (parts, _controller) = FakeTransportBuilder::new().build();
		let client = Client::spawn(parts, ClientOptions::default());
		let liveness = LivenessController::new(LivenessModel::Ephemeral, DEFAULT_PING_INTERVAL);

		assert_eq!(liveness.start(&client), LivenessState::Active);
		liveness.stop();
		assert_eq!(liveness.start(&client), LivenessState::Dormant);
	}
}

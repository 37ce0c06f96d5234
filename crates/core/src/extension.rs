//! Context-scoped assembly of the bus.
//!
//! An [`Extension`] owns the privileged dispatcher and hands out relays for
//! page windows and [`ExtensionContext`]s for the extension's own pages
//! (popup, options). Each of those owns exactly one client, created when it
//! is opened and closed when it is dropped.

use std::sync::Arc;

use intercom_protocol::{CapabilityCall, Notification};
use intercom_runtime::{Client, LivenessController};
use serde_json::Value;
use tracing::debug;

use crate::capability::CapabilityRegistry;
use crate::config::IntercomConfig;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::relay::{Connector, PageSink, Relay, RelayOptions, WindowId};

pub struct Extension {
	config: IntercomConfig,
	dispatcher: Arc<Dispatcher>,
}

impl Extension {
	pub fn new(config: IntercomConfig, registry: CapabilityRegistry) -> Result<Self> {
		config.validate()?;
		debug!(
			target = "intercom.dispatcher",
			methods = registry.methods().count(),
			model = ?config.liveness.model,
			"extension assembled"
		);
		Ok(Self {
			config,
			dispatcher: Dispatcher::new(registry),
		})
	}

	pub fn config(&self) -> &IntercomConfig {
		&self.config
	}

	pub fn dispatcher(&self) -> &Arc<Dispatcher> {
		&self.dispatcher
	}

	pub fn notify(&self, notification: Notification) -> usize {
		self.dispatcher.notify(notification)
	}

	pub fn suspend(&self) {
		self.dispatcher.suspend();
	}

	pub fn resume(&self) {
		self.dispatcher.resume();
	}

	pub fn relay_options(&self, window: WindowId, page_origin: impl Into<String>) -> RelayOptions {
		RelayOptions {
			forwarded: self.config.forwarded_notifications.clone(),
			client: self.config.client_options(),
			liveness_model: self.config.liveness.model,
			ping_interval: self.config.ping_interval(),
			..RelayOptions::new(window, page_origin)
		}
	}

	/// Creates the relay for one page window.
	///
	/// The relay connects lazily; call [`Relay::start`] to connect and begin
	/// keep-alive before the first page request.
	pub fn open_relay(&self, window: WindowId, page_origin: impl Into<String>, sink: Arc<dyn PageSink>) -> Arc<Relay> {
		let options = self.relay_options(window, page_origin);
		let connector: Arc<dyn Connector> = self.dispatcher.clone();
		Arc::new(Relay::new(options, connector, sink))
	}

	/// Opens a client for one of the extension's own contexts.
	pub fn open_context(&self) -> Result<ExtensionContext> {
		let parts = self.dispatcher.open_channel()?;
		let client = Client::spawn(parts, self.config.client_options());
		let liveness = LivenessController::new(self.config.liveness.model, self.config.ping_interval());
		liveness.start(&client);
		Ok(ExtensionContext { client, liveness })
	}
}

/// An extension-owned context: its client and its keep-alive.
///
/// Calls from here carry no page origin.
pub struct ExtensionContext {
	client: Arc<Client>,
	liveness: LivenessController,
}

impl ExtensionContext {
	pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
		let payload = serde_json::to_value(CapabilityCall::new(method, params)).map_err(intercom_runtime::Error::from)?;
		Ok(self.client.request(payload).await?)
	}

	pub fn subscribe<F>(&self, handler: F)
	where
		F: Fn(&Value) + Send + Sync + 'static,
	{
		self.client.subscribe(handler);
	}

	pub fn client(&self) -> &Arc<Client> {
		&self.client
	}

	pub fn liveness(&self) -> &LivenessController {
		&self.liveness
	}

	pub fn close(&self) {
		self.liveness.stop();
		self.client.close();
	}
}

impl Drop for ExtensionContext {
	fn drop(&mut self) {
		self.close();
	}
}

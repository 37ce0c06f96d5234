//! In-process walk through the whole bus: privileged dispatcher with demo
//! capabilities, one relay, and a page that records everything posted to it.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use intercom::{CapabilityRegistry, Extension, IntercomConfig, Notification, NotificationKind, PageEvent, WindowId, page_channel};
use serde_json::{Value, json};
use tracing::info;

pub const PAGE_ORIGIN: &str = "https://dapp.example";
const PAGE_WINDOW: WindowId = WindowId(1);
const STALL_LIMIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct SimulateOptions {
	pub requests: usize,
	pub notify: Vec<String>,
	pub fail: bool,
}

pub async fn execute(config: IntercomConfig, options: SimulateOptions) -> Result<()> {
	for line in run(config, options).await? {
		println!("{line}");
	}
	Ok(())
}

fn demo_capabilities() -> CapabilityRegistry {
	let mut registry = CapabilityRegistry::new();
	registry
		.register_fn("echo", |origin, params| async move { Ok(json!({"origin": origin, "params": params})) })
		.register_fn("getAccounts", |_, _| async { Ok(json!(["addr_test1qz", "addr_test1qr"])) })
		.register_fn("signTransaction", |_, params| async move {
			let amount = params["amount"].as_u64().unwrap_or_default();
			Err(anyhow!("balance 0 below requested {amount}").context("insufficient funds"))
		});
	registry
}

fn page_request(index: usize, method: &str, params: Value) -> PageEvent {
	PageEvent {
		source: PAGE_WINDOW,
		origin: PAGE_ORIGIN.to_string(),
		data: json!({
			"kind": "request",
			"correlationToken": format!("page-{index}"),
			"payload": {"method": method, "params": params},
		}),
	}
}

/// Runs the simulation and returns every page-bound message, in arrival order.
pub async fn run(config: IntercomConfig, options: SimulateOptions) -> Result<Vec<Value>> {
	let kinds: Vec<NotificationKind> = options.notify.iter().map(|kind| NotificationKind::from(kind.as_str())).collect();
	let visible = kinds.iter().filter(|kind| config.forwarded_notifications.contains(kind)).count();

	let extension = Extension::new(config, demo_capabilities())?;
	let (sink, mut page) = page_channel();
	let relay = extension.open_relay(PAGE_WINDOW, PAGE_ORIGIN, sink);
	relay.start().context("relay could not reach the privileged context")?;

	let (events, events_rx) = tokio::sync::mpsc::unbounded_channel();
	let serving = tokio::spawn(std::sync::Arc::clone(&relay).run(events_rx));

	let mut expected = 0;
	for index in 0..options.requests {
		let event = if index % 2 == 0 {
			page_request(index, "echo", json!({"n": index}))
		} else {
			page_request(index, "getAccounts", Value::Null)
		};
		events.send(event).context("relay stopped early")?;
		expected += 1;
	}
	if options.fail {
		events
			.send(page_request(options.requests, "signTransaction", json!({"amount": 42})))
			.context("relay stopped early")?;
		expected += 1;
	}

	for kind in kinds {
		let delivered = extension.notify(Notification::new(kind.clone(), json!({"source": "simulate"})));
		info!(target = "intercom", %kind, delivered, "notification broadcast");
	}
	expected += visible;

	let mut received = Vec::with_capacity(expected);
	while received.len() < expected {
		let Ok(posted) = tokio::time::timeout(STALL_LIMIT, page.recv()).await else {
			bail!("simulation stalled after {} of {expected} page messages", received.len());
		};
		let Some(posted) = posted else {
			bail!("page channel closed after {} of {expected} page messages", received.len());
		};
		received.push(json!({"targetOrigin": posted.target_origin, "message": posted.message}));
	}

	drop(events);
	serving.await.context("relay task failed")?;
	Ok(received)
}

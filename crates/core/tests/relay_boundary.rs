//! What may cross from the privileged context into the page, and from the page inward.

use std::time::Duration;

use intercom::{
	CapabilityRegistry, Disposition, Extension, IgnoreReason, IntercomConfig, Notification, NotificationKind, PageEvent, WindowId,
	page_channel,
};
use serde_json::json;

const DAPP: &str = "https://dapp.example";

fn registry() -> CapabilityRegistry {
	let mut registry = CapabilityRegistry::new();
	registry.register_fn("getAccounts", |origin, _| async move { Ok(json!({"origin": origin, "accounts": ["addr1"]})) });
	registry
}

fn extension() -> Extension {
	Extension::new(IntercomConfig::default(), registry()).unwrap()
}

#[tokio::test]
async fn broadcast_without_relays_completes() {
	let extension = extension();
	let delivered = extension.notify(Notification::new(NotificationKind::NetworkChanged, json!({"chainId": "preprod"})));
	assert_eq!(delivered, 0);
}

#[tokio::test]
async fn foreign_source_never_reaches_the_privileged_context() {
	let extension = extension();
	let (sink, mut page) = page_channel();
	let relay = extension.open_relay(WindowId(1), DAPP, sink);

	let event = PageEvent {
		source: WindowId(99),
		origin: "https://evil.example".to_string(),
		data: json!({"kind": "request", "correlationToken": 1, "payload": {"method": "getAccounts"}}),
	};
	assert_eq!(relay.handle(event).await, Disposition::Ignored(IgnoreReason::ForeignSource));
	assert_eq!(relay.pending_requests(), 0);
	assert!(page.try_recv().is_err());
}

#[tokio::test]
async fn only_allow_listed_notifications_reach_the_page() {
	let extension = extension();
	let (sink, mut page) = page_channel();
	let relay = extension.open_relay(WindowId(1), DAPP, sink);
	relay.start().unwrap();

	extension.notify(Notification::new("vault-locked", json!({})));
	extension.notify(Notification::new(NotificationKind::AccountChanged, json!({"address": "addr2"})));

	let posted = page.recv().await.unwrap();
	assert_eq!(posted.target_origin, DAPP);
	assert_eq!(posted.message["kind"], "notification");
	assert_eq!(posted.message["payload"]["kind"], "account-changed");
	assert_eq!(posted.message["payload"]["data"]["address"], "addr2");

	tokio::time::sleep(Duration::from_millis(20)).await;
	assert!(page.try_recv().is_err());
}

#[tokio::test]
async fn configured_allow_list_replaces_the_default() {
	let config = IntercomConfig {
		forwarded_notifications: vec![NotificationKind::PermissionRemoved],
		..IntercomConfig::default()
	};
	let extension = Extension::new(config, registry()).unwrap();
	let (sink, mut page) = page_channel();
	let relay = extension.open_relay(WindowId(1), DAPP, sink);
	relay.start().unwrap();

	extension.notify(Notification::new(NotificationKind::NetworkChanged, json!({})));
	extension.notify(Notification::new(NotificationKind::PermissionRemoved, json!({"origin": DAPP})));

	let posted = page.recv().await.unwrap();
	assert_eq!(posted.message["payload"]["kind"], "permission-removed");
}

#[tokio::test]
async fn every_relay_receives_each_notification_once() {
	let extension = extension();
	let (first_sink, mut first_page) = page_channel();
	let (second_sink, mut second_page) = page_channel();
	let first = extension.open_relay(WindowId(1), DAPP, first_sink);
	let second = extension.open_relay(WindowId(2), "https://other.example", second_sink);
	first.start().unwrap();
	second.start().unwrap();

	assert_eq!(extension.notify(Notification::new(NotificationKind::AccountRemoved, json!({}))), 2);

	assert_eq!(first_page.recv().await.unwrap().target_origin, DAPP);
	assert_eq!(second_page.recv().await.unwrap().target_origin, "https://other.example");
	tokio::time::sleep(Duration::from_millis(20)).await;
	assert!(first_page.try_recv().is_err());
	assert!(second_page.try_recv().is_err());
}

#[tokio::test]
async fn unreachable_privileged_context_fails_only_that_request() {
	let extension = extension();
	let (sink, mut page) = page_channel();
	let relay = extension.open_relay(WindowId(1), "https://dapp.example:8443", sink);
	relay.start().unwrap();

	let request = |token: u64| PageEvent {
		source: WindowId(1),
		origin: "https://dapp.example:8443".to_string(),
		data: json!({"kind": "request", "correlationToken": token, "payload": {"method": "getAccounts"}}),
	};

	extension.suspend();
	relay.handle(request(1)).await;
	let posted = page.recv().await.unwrap();
	assert_eq!(posted.target_origin, "https://dapp.example:8443");
	assert_eq!(posted.message["kind"], "error");
	assert!(posted.message["payload"]["message"].as_str().unwrap().starts_with("channel unavailable"));
	assert_eq!(relay.pending_requests(), 0);

	extension.resume();
	relay.handle(request(2)).await;
	let posted = page.recv().await.unwrap();
	assert_eq!(posted.message["kind"], "response");
	assert_eq!(posted.message["payload"]["origin"], "https://dapp.example:8443");
}

#[tokio::test]
async fn internal_kinds_cannot_be_allow_listed() {
	let config = IntercomConfig {
		forwarded_notifications: vec![NotificationKind::Internal("vault-locked".into())],
		..IntercomConfig::default()
	};
	let err = Extension::new(config, registry()).err().unwrap();
	assert!(matches!(err, intercom::Error::InvalidConfig(ref message) if message.contains("vault-locked")), "{err}");
}

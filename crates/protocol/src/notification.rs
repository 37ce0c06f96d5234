//! Broadcast notification payloads.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;

/// Kind of state change announced by the privileged context.
///
/// The four named kinds are the ones a page may observe. Anything else is an
/// internal signal and is kept as [`NotificationKind::Internal`] so it can
/// still be routed between privileged and relay contexts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
	NetworkChanged,
	PermissionRemoved,
	AccountChanged,
	AccountRemoved,
	Internal(String),
}

/// Kinds a relay forwards to the page unless configured otherwise.
pub const PAGE_VISIBLE_NOTIFICATIONS: [NotificationKind; 4] = [
	NotificationKind::NetworkChanged,
	NotificationKind::PermissionRemoved,
	NotificationKind::AccountChanged,
	NotificationKind::AccountRemoved,
];

impl NotificationKind {
	pub fn as_str(&self) -> &str {
		match self {
			Self::NetworkChanged => "network-changed",
			Self::PermissionRemoved => "permission-removed",
			Self::AccountChanged => "account-changed",
			Self::AccountRemoved => "account-removed",
			Self::Internal(name) => name,
		}
	}
}

impl From<String> for NotificationKind {
	fn from(value: String) -> Self {
		match value.as_str() {
			"network-changed" => Self::NetworkChanged,
			"permission-removed" => Self::PermissionRemoved,
			"account-changed" => Self::AccountChanged,
			"account-removed" => Self::AccountRemoved,
			_ => Self::Internal(value),
		}
	}
}

impl From<&str> for NotificationKind {
	fn from(value: &str) -> Self {
		Self::from(value.to_string())
	}
}

impl From<NotificationKind> for String {
	fn from(kind: NotificationKind) -> Self {
		match kind {
			NotificationKind::Internal(name) => name,
			other => other.as_str().to_string(),
		}
	}
}

impl fmt::Display for NotificationKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Typed view of a notification payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
	pub kind: NotificationKind,
	#[serde(default)]
	pub data: Value,
}

impl Notification {
	pub fn new(kind: impl Into<NotificationKind>, data: Value) -> Self {
		Self { kind: kind.into(), data }
	}

	/// Reads a notification out of an opaque bus payload.
	pub fn from_payload(payload: &Value) -> Option<Self> {
		serde_json::from_value(payload.clone()).ok()
	}

	pub fn to_payload(&self) -> serde_json::Result<Value> {
		serde_json::to_value(self)
	}

	pub fn into_message(self) -> serde_json::Result<Message> {
		Ok(Message::Notification { payload: self.to_payload()? })
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn known_kinds_round_trip_through_strings() {
		for kind in PAGE_VISIBLE_NOTIFICATIONS {
			let text = String::from(kind.clone());
			assert_eq!(NotificationKind::from(text), kind);
		}
	}

	#[test]
	fn unknown_kind_is_internal() {
		let notification = Notification::from_payload(&json!({"kind": "vault-locked"})).unwrap();
		assert_eq!(notification.kind, NotificationKind::Internal("vault-locked".into()));
		assert_eq!(notification.data, Value::Null);
	}

	#[test]
	fn payload_shape() {
		let payload = Notification::new(NotificationKind::NetworkChanged, json!({"chainId": "mainnet"})).to_payload().unwrap();
		assert_eq!(payload, json!({"kind": "network-changed", "data": {"chainId": "mainnet"}}));
	}

	#[test]
	fn non_object_payload_is_not_a_notification() {
		assert!(Notification::from_payload(&json!("network-changed")).is_none());
	}
}

//! Request payloads understood by the privileged context.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method name reserved for liveness pings.
pub const WAKEUP_METHOD: &str = "intercom.wakeup";

/// A capability invocation as sent by a page.
///
/// ```json
/// { "method": "signTransaction", "params": { "to": "..." } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityCall {
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

impl CapabilityCall {
	pub fn new(method: impl Into<String>, params: Value) -> Self {
		Self {
			method: method.into(),
			params,
		}
	}

	/// The keep-alive ping. Carries no parameters and expects no result.
	pub fn wakeup() -> Self {
		Self::new(WAKEUP_METHOD, Value::Null)
	}

	pub fn is_wakeup(&self) -> bool {
		self.method == WAKEUP_METHOD
	}
}

/// A page request re-addressed by the relay to the privileged context.
///
/// `origin` is taken from the relay's own view of the sender, never from the
/// page payload, so authorization can be scoped to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginTaggedRequest {
	pub origin: String,
	pub call: Value,
}

/// Payload of a bus Request as seen by the privileged dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrivilegedRequest {
	Relayed(OriginTaggedRequest),
	Direct(CapabilityCall),
}

impl PrivilegedRequest {
	pub fn from_payload(payload: Value) -> Option<Self> {
		serde_json::from_value(payload).ok()
	}
}

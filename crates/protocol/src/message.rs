//! Bus message envelope.
//!
//! Every exchange between two contexts is a [`Message`]. The `kind` tag
//! discriminates the four message kinds; correlated kinds additionally carry
//! an `id` that the answering side must echo verbatim:
//!
//! ```json
//! { "kind": "request",  "id": 7, "payload": { "method": "getAccounts" } }
//! { "kind": "response", "id": 7, "payload": ["addr1"] }
//! { "kind": "error",    "id": 7, "payload": { "message": "locked" } }
//! { "kind": "notification", "payload": { "kind": "network-changed" } }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SerializedError;

/// Identifier pairing a Response/Error with the Request that caused it.
///
/// Unique only among the requests outstanding from one client instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Discriminator of the four message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
	Request,
	Response,
	Error,
	Notification,
}

impl MessageKind {
	/// Whether messages of this kind carry a correlation id.
	pub fn is_correlated(self) -> bool {
		!matches!(self, Self::Notification)
	}
}

/// The only unit ever transmitted on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
	Request {
		id: CorrelationId,
		#[serde(default)]
		payload: Value,
	},
	Response {
		id: CorrelationId,
		#[serde(default)]
		payload: Value,
	},
	Error {
		id: CorrelationId,
		#[serde(default = "SerializedError::unspecified")]
		payload: SerializedError,
	},
	Notification {
		#[serde(default)]
		payload: Value,
	},
}

impl Message {
	pub fn kind(&self) -> MessageKind {
		match self {
			Self::Request { .. } => MessageKind::Request,
			Self::Response { .. } => MessageKind::Response,
			Self::Error { .. } => MessageKind::Error,
			Self::Notification { .. } => MessageKind::Notification,
		}
	}

	/// Returns the correlation id, or `None` for notifications.
	pub fn correlation_id(&self) -> Option<CorrelationId> {
		match self {
			Self::Request { id, .. } | Self::Response { id, .. } | Self::Error { id, .. } => Some(*id),
			Self::Notification { .. } => None,
		}
	}

	/// Encodes the message into its structural-copy form.
	pub fn to_value(&self) -> serde_json::Result<Value> {
		serde_json::to_value(self)
	}

	/// Decodes a structural copy received from another context.
	pub fn from_value(value: Value) -> serde_json::Result<Self> {
		serde_json::from_value(value)
	}
}

//! Page-facing protocol.
//!
//! Pages talk to the relay with their own correlation token, which is chosen
//! by the page and echoed back verbatim. It is independent from the bus
//! [`CorrelationId`](crate::CorrelationId) space:
//!
//! ```json
//! { "kind": "request",  "correlationToken": "abc", "payload": { "method": "getAccounts" } }
//! { "kind": "response", "correlationToken": "abc", "payload": ["addr1"] }
//! { "kind": "error",    "correlationToken": "abc", "payload": { "message": "denied" } }
//! { "kind": "notification", "payload": { "kind": "account-changed" } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SerializedError;
use crate::message::MessageKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PageMessage {
	Request {
		correlation_token: Value,
		#[serde(default)]
		payload: Value,
	},
	Response {
		correlation_token: Value,
		#[serde(default)]
		payload: Value,
	},
	Error {
		correlation_token: Value,
		payload: SerializedError,
	},
	Notification {
		#[serde(default)]
		payload: Value,
	},
}

impl PageMessage {
	pub fn kind(&self) -> MessageKind {
		match self {
			Self::Request { .. } => MessageKind::Request,
			Self::Response { .. } => MessageKind::Response,
			Self::Error { .. } => MessageKind::Error,
			Self::Notification { .. } => MessageKind::Notification,
		}
	}

	pub fn correlation_token(&self) -> Option<&Value> {
		match self {
			Self::Request { correlation_token, .. } | Self::Response { correlation_token, .. } | Self::Error { correlation_token, .. } => {
				Some(correlation_token)
			}
			Self::Notification { .. } => None,
		}
	}

	pub fn from_value(value: Value) -> serde_json::Result<Self> {
		serde_json::from_value(value)
	}

	pub fn to_value(&self) -> serde_json::Result<Value> {
		serde_json::to_value(self)
	}
}

//! Boundary-safe error shape.
//!
//! Arbitrary error values cannot survive a structural copy, so any failure
//! that crosses a context boundary is flattened into a [`SerializedError`]:
//!
//! ```json
//! { "message": "insufficient funds", "errors": ["balance 0 < 10"] }
//! ```
//!
//! The receiving side rebuilds a [`RemoteError`] from it. Class and identity
//! of the original failure are discarded on purpose; only the message and
//! optional sub-errors remain.
//!
//! Decoding never fails. A peer that sends a bare string, a non-list
//! `errors`, or some other value still produces an error whose message is
//! the best textual form available, so a correlated Error always settles its
//! request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generic error as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct SerializedError {
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub errors: Option<Vec<Value>>,
}

impl SerializedError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			errors: None,
		}
	}

	/// Stand-in for an Error that arrived without any usable payload.
	pub fn unspecified() -> Self {
		Self::new("unknown error")
	}

	/// Attaches sub-errors. An empty list is stored as absent.
	pub fn with_errors(mut self, errors: Vec<Value>) -> Self {
		self.errors = if errors.is_empty() { None } else { Some(errors) };
		self
	}

	/// Flattens an error and its `source()` chain.
	///
	/// The top-level display becomes `message`; every source in the chain is
	/// recorded as a string sub-error.
	pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
		let mut errors = Vec::new();
		let mut source = err.source();
		while let Some(inner) = source {
			errors.push(Value::String(inner.to_string()));
			source = inner.source();
		}
		Self::new(err.to_string()).with_errors(errors)
	}

	/// Reconstructs the generic error value on the receiving side.
	pub fn into_remote(self) -> RemoteError {
		RemoteError {
			message: self.message,
			errors: self.errors.unwrap_or_default(),
		}
	}
}

impl From<Value> for SerializedError {
	fn from(value: Value) -> Self {
		match value {
			Value::String(message) => Self::new(message),
			Value::Object(mut fields) => {
				let message = match fields.remove("message") {
					Some(Value::String(message)) => message,
					Some(Value::Null) | None => Value::Object(fields.clone()).to_string(),
					Some(other) => other.to_string(),
				};
				let errors = match fields.remove("errors") {
					Some(Value::Array(errors)) => errors,
					Some(Value::Null) | None => Vec::new(),
					Some(other) => vec![other],
				};
				Self::new(message).with_errors(errors)
			}
			Value::Null => Self::unspecified(),
			other => Self::new(other.to_string()),
		}
	}
}

/// Generic error reconstructed from a [`SerializedError`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
	pub message: String,
	pub errors: Vec<Value>,
}

impl From<SerializedError> for RemoteError {
	fn from(err: SerializedError) -> Self {
		err.into_remote()
	}
}

impl From<RemoteError> for SerializedError {
	fn from(err: RemoteError) -> Self {
		SerializedError::new(err.message).with_errors(err.errors)
	}
}

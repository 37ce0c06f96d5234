//! Error types for the bus runtime.

use std::time::Duration;

use intercom_protocol::{RemoteError, SerializedError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The transport could not accept a send (peer unreachable or gone).
	#[error("channel unavailable: {0}")]
	ChannelUnavailable(String),

	/// The owning context was torn down while the request was pending.
	#[error("client closed")]
	ClientClosed,

	/// The remote side answered with an error. Only message and sub-errors survive.
	#[error(transparent)]
	Remote(#[from] RemoteError),

	#[error("request timed out after {0:?}")]
	Timeout(Duration),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl Error {
	pub fn is_closed(&self) -> bool {
		matches!(self, Self::ClientClosed)
	}

	pub fn is_remote(&self) -> bool {
		matches!(self, Self::Remote(_))
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout(_))
	}

	pub fn is_unavailable(&self) -> bool {
		matches!(self, Self::ChannelUnavailable(_))
	}

	/// Flattens the error for transmission to another context.
	///
	/// A remote error is passed through unchanged so relayed failures keep the
	/// message produced where the failure happened.
	pub fn to_serialized(&self) -> SerializedError {
		match self {
			Self::Remote(remote) => remote.clone().into(),
			other => SerializedError::from_error(other),
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn remote_error_passes_through_serialization() {
		let err = Error::Remote(SerializedError::new("insufficient funds").with_errors(vec![json!("nonce")]).into_remote());
		let serialized = err.to_serialized();
		assert_eq!(serialized.message, "insufficient funds");
		assert_eq!(serialized.errors, Some(vec![json!("nonce")]));
	}

	#[test]
	fn local_errors_serialize_by_display() {
		assert_eq!(Error::ClientClosed.to_serialized().message, "client closed");
		assert_eq!(
			Error::ChannelUnavailable("privileged context not reachable".into()).to_serialized().message,
			"channel unavailable: privileged context not reachable"
		);
	}

	#[test]
	fn predicates() {
		assert!(Error::ClientClosed.is_closed());
		assert!(Error::Timeout(Duration::from_secs(1)).is_timeout());
		assert!(Error::ChannelUnavailable(String::new()).is_unavailable());
		assert!(!Error::ClientClosed.is_remote());
	}
}

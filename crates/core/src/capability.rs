//! Privileged capabilities reachable through the bus.
//!
//! Wallet operations (signing, account lookup, permission storage) live
//! outside the bus. The dispatcher only sees them as named async operations
//! that return a JSON result or fail.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use intercom_protocol::SerializedError;
use serde_json::Value;

/// An opaque async operation executed in the privileged context.
#[async_trait]
pub trait Capability: Send + Sync {
	/// Runs the operation.
	///
	/// `origin` is the page origin attached by the relay, or `None` for calls
	/// issued by the extension's own contexts.
	async fn invoke(&self, origin: Option<&str>, params: Value) -> anyhow::Result<Value>;
}

/// Adapts an async closure into a [`Capability`].
pub struct FnCapability<F> {
	f: F,
}

#[async_trait]
impl<F, Fut> Capability for FnCapability<F>
where
	F: Fn(Option<String>, Value) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
	async fn invoke(&self, origin: Option<&str>, params: Value) -> anyhow::Result<Value> {
		(self.f)(origin.map(str::to_owned), params).await
	}
}

/// Method name → capability lookup table.
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
	capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, method: impl Into<String>, capability: Arc<dyn Capability>) -> &mut Self {
		self.capabilities.insert(method.into(), capability);
		self
	}

	pub fn register_fn<F, Fut>(&mut self, method: impl Into<String>, f: F) -> &mut Self
	where
		F: Fn(Option<String>, Value) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
	{
		self.register(method, Arc::new(FnCapability { f }))
	}

	pub fn get(&self, method: &str) -> Option<Arc<dyn Capability>> {
		self.capabilities.get(method).cloned()
	}

	pub fn methods(&self) -> impl Iterator<Item = &str> {
		self.capabilities.keys().map(String::as_str)
	}
}

/// Flattens a capability failure for the wire.
///
/// The top-level message is kept; each error in the context chain becomes a
/// string sub-error.
pub fn serialize_failure(err: &anyhow::Error) -> SerializedError {
	let errors = err.chain().skip(1).map(|cause| Value::String(cause.to_string())).collect();
	SerializedError::new(err.to_string()).with_errors(errors)
}

//! Bus configuration.
//!
//! A single JSON document, every field optional:
//!
//! ```json
//! {
//!   "schema": 1,
//!   "liveness": { "model": "ephemeral", "intervalMs": 10000 },
//!   "requestTimeoutMs": null,
//!   "forwardedNotifications": ["network-changed", "account-changed"]
//! }
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use intercom_protocol::{NotificationKind, PAGE_VISIBLE_NOTIFICATIONS};
use intercom_runtime::{ClientOptions, DEFAULT_PING_INTERVAL, LivenessModel};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const CONFIG_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessConfig {
	#[serde(default)]
	pub model: LivenessModel,
	#[serde(default = "default_interval_ms")]
	pub interval_ms: u64,
}

impl Default for LivenessConfig {
	fn default() -> Self {
		Self {
			model: LivenessModel::default(),
			interval_ms: default_interval_ms(),
		}
	}
}

fn default_interval_ms() -> u64 {
	DEFAULT_PING_INTERVAL.as_millis() as u64
}

fn default_forwarded() -> Vec<NotificationKind> {
	PAGE_VISIBLE_NOTIFICATIONS.to_vec()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntercomConfig {
	#[serde(default = "schema_version")]
	pub schema: u32,
	#[serde(default)]
	pub liveness: LivenessConfig,
	/// No timeout when absent: a request waits until answered or its client closes.
	#[serde(default)]
	pub request_timeout_ms: Option<u64>,
	/// Notification kinds a relay passes through to its page.
	///
	/// May only narrow the page-visible kinds; internal kinds are rejected.
	#[serde(default = "default_forwarded")]
	pub forwarded_notifications: Vec<NotificationKind>,
}

fn schema_version() -> u32 {
	CONFIG_SCHEMA_VERSION
}

impl Default for IntercomConfig {
	fn default() -> Self {
		Self {
			schema: CONFIG_SCHEMA_VERSION,
			liveness: LivenessConfig::default(),
			request_timeout_ms: None,
			forwarded_notifications: default_forwarded(),
		}
	}
}

impl IntercomConfig {
	/// Loads a config file. A missing file yields the defaults.
	pub fn load(path: &Path) -> Result<Self> {
		let content = match fs::read_to_string(path) {
			Ok(content) => content,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
			Err(err) => return Err(err.into()),
		};

		let config: Self = serde_json::from_str(&content).map_err(|err| Error::Config {
			path: path.to_path_buf(),
			message: err.to_string(),
		})?;
		config.validate().map_err(|err| match err {
			Error::InvalidConfig(message) => Error::Config {
				path: path.to_path_buf(),
				message,
			},
			other => other,
		})?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<()> {
		if self.schema != CONFIG_SCHEMA_VERSION {
			return Err(Error::InvalidConfig(format!("unsupported schema version {}", self.schema)));
		}
		if self.liveness.interval_ms == 0 {
			return Err(Error::InvalidConfig("liveness.intervalMs must be greater than zero".to_string()));
		}
		if self.request_timeout_ms == Some(0) {
			return Err(Error::InvalidConfig("requestTimeoutMs must be greater than zero".to_string()));
		}
		if let Some(kind) = self.forwarded_notifications.iter().find(|kind| !PAGE_VISIBLE_NOTIFICATIONS.contains(*kind)) {
			return Err(Error::InvalidConfig(format!("forwardedNotifications: {kind} is internal-only")));
		}
		Ok(())
	}

	pub fn ping_interval(&self) -> Duration {
		Duration::from_millis(self.liveness.interval_ms)
	}

	pub fn request_timeout(&self) -> Option<Duration> {
		self.request_timeout_ms.map(Duration::from_millis)
	}

	pub fn client_options(&self) -> ClientOptions {
		ClientOptions {
			request_timeout: self.request_timeout(),
		}
	}
}

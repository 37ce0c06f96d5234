//! Cross-context request/notification bus for a wallet browser extension.
//!
//! Three mutually distrustful contexts share one bus:
//!
//! ```text
//!  page ──PageMessage──▶ Relay ──OriginTaggedRequest──▶ Dispatcher ──▶ capability
//!  page ◀──filtered───── Relay ◀──Response/Error─────── Dispatcher
//!  page ◀──allow-listed─ Relay ◀──Notification (broadcast)── Dispatcher
//! ```
//!
//! * [`Relay`] validates page traffic, tags it with the page origin and
//!   forwards it through its own correlating [`Client`].
//! * [`Dispatcher`] executes capabilities in the privileged context and
//!   broadcasts state changes to every connected relay.
//! * [`LivenessController`] keeps an ephemeral privileged context awake.
//! * [`Extension`] assembles all of it from one [`IntercomConfig`] so each
//!   context owns exactly one client without any process-global state.

pub mod capability;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod extension;
pub mod relay;

pub use capability::{Capability, CapabilityRegistry};
pub use config::{IntercomConfig, LivenessConfig};
pub use dispatcher::{Dispatcher, PrivilegedConnection};
pub use error::{Error, Result};
pub use extension::{Extension, ExtensionContext};
pub use intercom_protocol as protocol;
pub use intercom_protocol::{Notification, NotificationKind};
pub use intercom_runtime::{Client, ClientOptions, LivenessController, LivenessModel, LivenessState};
pub use relay::{Connector, Disposition, IgnoreReason, PageEvent, PageSink, PostedMessage, Relay, RelayOptions, WindowId, page_channel};

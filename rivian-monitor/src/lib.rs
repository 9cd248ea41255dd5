//! Rivian subscription monitor
//!
//! Keeps a `graphql-transport-ws` connection to the Rivian gateway alive
//! and replays every active subscription after a reconnect, so callbacks
//! keep receiving vehicle updates across network drops.
//!
//! # Example
//!
//! ```ignore
//! use rivian_monitor::{MonitorConfig, Supervisor, WsConnector, sync_callback};
//! use serde_json::json;
//!
//! let config = MonitorConfig::default();
//! let monitor = Supervisor::new(WsConnector::new(&config), move || json!({"u-sess": token}), config);
//!
//! monitor.connect().await?;
//! let handle = monitor
//!     .subscribe(json!({"query": QUERY, "variables": {"vehicleID": id}}), sync_callback(|frame| {
//!         println!("{frame}");
//!     }))
//!     .await?;
//!
//! handle.unsubscribe().await?;
//! monitor.close().await;
//! ```

mod backoff;
mod config;
mod error;
pub mod registry;
mod supervisor;
pub mod transport;
mod ws;

pub use backoff::Backoff;
pub use config::MonitorConfig;
pub use error::MonitorError;
pub use registry::{Callback, SubscriptionRegistry, callback, sync_callback};
pub use supervisor::{ConnectionState, SubscriptionHandle, Supervisor};
pub use transport::{Connector, ReadEvent, TransportError};
pub use ws::WsConnector;

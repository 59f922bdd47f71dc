//! Proxy-side connection management for SOME/IP IPC.
//!
//! This module provides:
//! - A connection proxy that multiplexes several service instances over
//!   one TCP connection to a skeleton process
//! - Connection state tracking and statistics
//! - Configuration for timeouts, keep-alive, and peer integrity
//!
//! Reconnection is not owned by this core: a [`ConnectionProxy`] that
//! loses its connection lands back in [`ConnectionState::Disconnected`]
//! and leaves the decision to retry with the caller.
//!
//! # Example
//!
//! ```no_run
//! use someip_transport_core::connection::{ConnectionProxy, ConnectionProxyConfig};
//! use someip_transport_core::router::{RouterConnector, ServiceInstanceId};
//! use std::sync::Arc;
//!
//! # async fn run() -> someip_transport_core::Result<()> {
//! let connector = Arc::new(RouterConnector::new());
//! let config = ConnectionProxyConfig::default();
//! let proxy = ConnectionProxy::new("127.0.0.1:30509".parse().unwrap(), connector, config);
//!
//! proxy.connect(ServiceInstanceId(0x1234)).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod ipc;
mod proxy;
mod state;

pub use config::{ConnectionConfig, ConnectionProxyConfig, IntegrityLevel, KeepAliveConfig};
pub use ipc::{IpcHeader, IpcMessage, IpcMessageKind, IPC_HEADER_SIZE};
pub use proxy::{ConnectionProxy, PeerCredentials};
pub use state::{ConnectionState, ConnectionStats};

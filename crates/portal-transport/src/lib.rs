//! Session-bound notification channel between a page and its portal.
//!
//! [`Transport`] owns at most one connection at a time. Outbound
//! notifications are queued and written strictly in order, surviving
//! reconnects. Inbound notifications are dispatched one at a time, in
//! arrival order, to handlers registered by method name; dispatch pauses
//! while the lock counter is non-zero.

pub mod config;
pub mod connector;
pub mod error;
pub mod events;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod registry;
mod supervisor;
pub mod transport;

pub use config::TransportConfig;
pub use connector::{Connection, Connector, FrameSink, FrameStream, WsConnector};
pub use error::TransportError;
pub use events::{ConnectionState, TransportEvent};
pub use registry::{HandlerRegistry, NotificationHandler};
pub use transport::{Transport, WeakTransport};

//! Network transport layer for caenlink
//!
//! This crate provides the long-lived TCP line connector used to talk to CAEN
//! RFID readers over a raw socket. It handles connection management, line
//! framing via `LinesCodec`, decoupled message dispatch and automatic
//! reconnection.
//!
//! # Components
//!
//! - **Connector**: owns the socket, its lifecycle and the reconnect policy
//! - **ConnectorOwner**: capability bound to a connector that receives lines
//!   and connection-loss notifications
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use caenlink_network::{Connector, ConnectorConfig, ConnectorOwner};
//!
//! struct Log;
//!
//! impl ConnectorOwner for Log {
//!     fn message_received(&self, line: &str) {
//!         println!("{line}");
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = Connector::new(ConnectorConfig::new("127.0.0.1", 1000, true));
//! connector.bind(Arc::new(Log));
//! connector.establish_connection().await?;
//! # Ok(())
//! # }
//! ```

mod connector;
mod dispatcher;
mod owner;
mod queue;
mod reader;

pub use connector::{
    ConnectionState, Connector, ConnectorConfig, ConnectorError, DEFAULT_PORT,
    DEFAULT_RECONNECT_DELAY,
};
pub use owner::ConnectorOwner;

//! Hardware abstraction layer for CAEN RFID readers.
//!
//! This crate exposes CAEN readers through a generic reader-controller
//! contract. A controller reports what its read points see as
//! [`Observation`]s and declares which optional operations (tag memory
//! access, parameters, read point control) it supports.
//!
//! # Design Philosophy
//!
//! - **Async-first**: I/O operations use native `async fn` in traits
//!   (Rust 1.90 + Edition 2024 RPITIT).
//! - **Capability queries**: every optional operation has a matching
//!   `supports_*` query and reports [`HalError::UnsupportedOperation`] when
//!   called on a controller that lacks it.
//! - **Thread-safe**: controllers are `Send + Sync` for use with Tokio.
//!
//! # Controllers
//!
//! [`CaenTcpController`] talks to a reader over a raw TCP line connection
//! provided by `caenlink-network`. Tags are streamed one identifier per line
//! and collected between `identify` calls:
//!
//! ```no_run
//! use caenlink_hal::{CaenTcpController, HardwareAbstraction};
//!
//! # async fn example() -> caenlink_hal::Result<()> {
//! let mut controller = CaenTcpController::new("CaenTCPController", None)?;
//! controller.initialize().await?;
//!
//! let observations = controller.identify(&controller.read_point_names()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! Controllers read a TOML file (see [`config`]). Without one, the
//! configuration embedded in this crate is used.

pub mod config;
pub mod controller;
pub mod error;
pub mod inventory;
pub mod traits;
pub mod types;

pub use config::{ConfigSource, ControllerSettings, ReaderConfig};
pub use controller::{CaenTcpController, DEFAULT_HAL_NAME};
pub use error::{HalError, Result};
pub use inventory::InventoryCollector;
pub use traits::{AsynchronousIdentifyListener, HardwareAbstraction};
pub use types::{
    EpcTransponderModel, IdType, InventoryItem, MemoryBankDescriptor, MemoryDescriptor,
    Observation, TagDescriptor, TransponderType, Trigger,
};

//! CAEN reader controller over TCP.
//!
//! [`CaenTcpController`] drives a CAEN reader that streams one tag identifier
//! per line over a TCP connection. It owns a [`Connector`] and binds an
//! [`InventoryCollector`] to it; `identify` turns whatever the collector has
//! gathered since the previous call into observations.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐  lines   ┌────────────────────┐
//! │     Connector     │─────────▶│ InventoryCollector │
//! │ (reader task,     │          │ (dedup, first-seen │
//! │  dispatcher task) │          │  order)            │
//! └─────────▲─────────┘          └─────────┬──────────┘
//!           │ send_command                 │ drain
//!           │                              ▼
//! ┌─────────┴──────────────────────────────────────────┐
//! │                 CaenTcpController                  │
//! │  identify() -> Vec<Observation>                    │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! The collector is a separate object handed to the connector, so the
//! connector never holds a reference back to the controller.
//!
//! # Example Usage
//!
//! ```no_run
//! use caenlink_hal::{CaenTcpController, HardwareAbstraction};
//!
//! # async fn example() -> caenlink_hal::Result<()> {
//! let mut controller = CaenTcpController::new("CaenTCPController", None)?;
//! controller.initialize().await?;
//!
//! let read_points = controller.read_point_names();
//! for observation in controller.identify(&read_points).await? {
//!     println!("{}: {:?}", observation.read_point_name, observation.ids);
//! }
//!
//! controller.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use caenlink_network::{ConnectionState, Connector};
use tracing::{debug, info, warn};

use crate::config::ReaderConfig;
use crate::error::{HalError, Result};
use crate::inventory::InventoryCollector;
use crate::traits::HardwareAbstraction;
use crate::types::{IdType, InventoryItem, Observation, TransponderType};

/// Default controller name.
pub const DEFAULT_HAL_NAME: &str = "CaenTCPController";

/// Controller for a CAEN reader reachable over TCP.
pub struct CaenTcpController {
    hal_name: String,
    config: ReaderConfig,
    connector: Connector,
    collector: Arc<InventoryCollector>,
    read_points: Vec<String>,
    id_type: IdType,
    current_inventory: Vec<InventoryItem>,
}

impl CaenTcpController {
    /// Create a controller from the configuration file at `config_path`.
    ///
    /// Falls back to the embedded configuration when no path is given or the
    /// file does not exist. No connection is made until
    /// [`initialize`](Self::initialize).
    ///
    /// # Errors
    ///
    /// Returns [`HalError::Configuration`] if the configuration is invalid.
    pub fn new(hal_name: impl Into<String>, config_path: Option<&Path>) -> Result<Self> {
        let config = ReaderConfig::load(config_path)?;
        Ok(Self::with_config(hal_name, config))
    }

    /// Create a controller from an already loaded configuration.
    pub fn with_config(hal_name: impl Into<String>, config: ReaderConfig) -> Self {
        let connector = Connector::new(config.connector_config());

        let read_points = if config.settings().read_points.is_empty() {
            vec![connector.address()]
        } else {
            config.settings().read_points.clone()
        };

        Self {
            hal_name: hal_name.into(),
            id_type: config.id_type(),
            config,
            connector,
            collector: Arc::new(InventoryCollector::new()),
            read_points,
            current_inventory: Vec::new(),
        }
    }

    /// Bind the inventory collector and connect to the reader.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::Connector`] if the connection cannot be made.
    pub async fn initialize(&self) -> Result<()> {
        self.connector.bind(self.collector.clone());
        self.connector.establish_connection().await?;

        info!(
            hal = %self.hal_name,
            address = %self.connector.address(),
            read_points = ?self.read_points,
            "Controller initialized"
        );
        Ok(())
    }

    /// Send a raw command line to the reader.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::Connector`] if the reader is not connected or the
    /// write fails.
    pub async fn send_command(&self, line: &str) -> Result<()> {
        debug!(hal = %self.hal_name, command = line, "Sending command");
        self.connector.send(line).await?;
        Ok(())
    }

    /// Stop the connector and its background tasks.
    pub async fn shutdown(&self) {
        info!(hal = %self.hal_name, "Shutting down controller");
        self.connector.shutdown().await;
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.connector.state()
    }

    /// Underlying connector.
    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    /// Loaded configuration.
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Inventory produced by the last `identify`.
    pub fn current_inventory(&self) -> &[InventoryItem] {
        &self.current_inventory
    }

    fn check_read_point(&self, name: &str) -> Result<()> {
        if self.read_points.iter().any(|known| known == name) {
            Ok(())
        } else {
            Err(HalError::read_point_not_found(name))
        }
    }
}

impl HardwareAbstraction for CaenTcpController {
    fn hal_name(&self) -> &str {
        &self.hal_name
    }

    fn read_point_names(&self) -> Vec<String> {
        self.read_points.clone()
    }

    async fn identify(&mut self, read_points: &[String]) -> Result<Vec<Observation>> {
        for name in read_points {
            self.check_read_point(name)?;
        }
        if !self.connector.is_connected() {
            return Err(HalError::disconnected(&self.hal_name));
        }

        self.current_inventory.clear();
        let ids = self.collector.drain();
        let model = self.config.settings().epc_transponder_model;

        let mut observations = Vec::with_capacity(read_points.len());
        for name in read_points {
            let items: Vec<InventoryItem> = ids
                .iter()
                .map(|id| InventoryItem {
                    id: id.clone(),
                    transponder_type: TransponderType::EpcClass1Gen2,
                    tid: Vec::new(),
                    read_point: name.clone(),
                    model,
                })
                .collect();

            observations.push(
                Observation::new(self.hal_name.clone(), name.clone())
                    .with_items(&items, &self.id_type),
            );
            self.current_inventory.extend(items);
        }

        debug!(
            hal = %self.hal_name,
            tags = ids.len(),
            read_points = read_points.len(),
            "Identify complete"
        );
        Ok(observations)
    }

    fn all_parameter_names(&self) -> Result<Vec<String>> {
        Ok(self.config.parameter_names())
    }

    fn get_parameter(&self, name: &str) -> Result<Option<String>> {
        Ok(self.config.parameter(name).map(str::to_string))
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> Result<()> {
        debug!(hal = %self.hal_name, name, value, "Ignoring parameter update");
        Ok(())
    }

    fn supports_parameters(&self) -> bool {
        true
    }

    /// Reload the configuration and reconnect with it.
    ///
    /// A configuration that fails to load leaves the controller untouched.
    async fn reset(&mut self) -> Result<()> {
        info!(hal = %self.hal_name, "Resetting controller");
        let config = self.config.reload().inspect_err(|e| {
            warn!(hal = %self.hal_name, error = %e, "Reset aborted, keeping current configuration");
        })?;

        self.connector.shutdown().await;
        *self = Self::with_config(self.hal_name.clone(), config);
        self.initialize().await
    }

    fn supports_reset(&self) -> bool {
        true
    }

    async fn read_point_power_level(&mut self, read_point: &str, _normalize: bool) -> Result<i32> {
        warn!(hal = %self.hal_name, read_point, "Power level not available, reporting 0");
        Ok(0)
    }

    fn is_read_point_ready(&self, read_point: &str) -> Result<bool> {
        Ok(self
            .read_points
            .iter()
            .any(|known| known.eq_ignore_ascii_case(read_point)))
    }

    fn supports_is_read_point_ready(&self) -> bool {
        true
    }
}

//! Hardware abstraction trait definitions.
//!
//! [`HardwareAbstraction`] is the contract every reader controller exposes.
//! Most readers only implement part of it, so every operation has a default
//! body that reports [`HalError::UnsupportedOperation`] and every capability
//! query defaults to `false`. Implementations override what they support.
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use std::sync::Arc;

use crate::error::{HalError, Result};
use crate::types::{Observation, Trigger};

/// Receives observations from asynchronous identification.
pub trait AsynchronousIdentifyListener: Send + Sync {
    /// Called with the observations of one asynchronous identify cycle.
    fn observations_received(&self, hal_name: &str, observations: &[Observation]);
}

/// Generic reader controller surface.
///
/// # Example Implementation
///
/// ```rust,ignore
/// struct FixedReader;
///
/// impl HardwareAbstraction for FixedReader {
///     fn hal_name(&self) -> &str {
///         "fixed"
///     }
///
///     fn read_point_names(&self) -> Vec<String> {
///         vec!["antenna-1".to_string()]
///     }
///
///     async fn identify(&mut self, read_points: &[String]) -> Result<Vec<Observation>> {
///         Ok(read_points
///             .iter()
///             .map(|name| Observation::new("fixed", name.clone()))
///             .collect())
///     }
/// }
/// ```
pub trait HardwareAbstraction: Send + Sync {
    /// Get the controller name.
    fn hal_name(&self) -> &str;

    /// Get the names of all read points.
    fn read_point_names(&self) -> Vec<String>;

    /// Identify the tags currently in range of each read point.
    ///
    /// Returns one observation per requested read point.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A read point name is unknown
    /// - The reader is disconnected
    async fn identify(&mut self, read_points: &[String]) -> Result<Vec<Observation>>;

    // Asynchronous identification.

    /// Start identifying continuously on a trigger.
    async fn start_asynchronous_identify(
        &mut self,
        _read_points: &[String],
        _trigger: Trigger,
    ) -> Result<()> {
        Err(HalError::unsupported("startAsynchronousIdentify"))
    }

    /// Stop asynchronous identification.
    async fn stop_asynchronous_identify(&mut self) -> Result<()> {
        Err(HalError::unsupported("stopAsynchronousIdentify"))
    }

    /// Check whether asynchronous identification is running.
    fn is_asynchronous_identify_running(&self) -> Result<bool> {
        Err(HalError::unsupported("isAsynchronousIdentifyRunning"))
    }

    /// Register a listener for asynchronous observations.
    fn add_asynchronous_identify_listener(
        &mut self,
        _listener: Arc<dyn AsynchronousIdentifyListener>,
    ) -> Result<()> {
        Err(HalError::unsupported("addAsynchronousIdentifyListener"))
    }

    /// Remove a previously registered listener.
    fn remove_asynchronous_identify_listener(
        &mut self,
        _listener: &Arc<dyn AsynchronousIdentifyListener>,
    ) -> Result<()> {
        Err(HalError::unsupported("removeAsynchronousIdentifyListener"))
    }

    fn supports_asynchronous_identify(&self) -> bool {
        false
    }

    // Tag memory.

    /// Read `length` bytes from memory bank `bank` of tag `id`.
    async fn read_bytes(
        &mut self,
        _read_point: &str,
        _id: &str,
        _bank: usize,
        _offset: usize,
        _length: usize,
    ) -> Result<Vec<u8>> {
        Err(HalError::unsupported("readBytes"))
    }

    fn supports_read_bytes(&self) -> bool {
        false
    }

    /// Write `data` into memory bank `bank` of tag `id`.
    async fn write_bytes(
        &mut self,
        _read_point: &str,
        _id: &str,
        _bank: usize,
        _offset: usize,
        _data: &[u8],
    ) -> Result<()> {
        Err(HalError::unsupported("writeBytes"))
    }

    fn supports_write_bytes(&self) -> bool {
        false
    }

    /// Permanently disable tag `id`.
    async fn kill(&mut self, _read_point: &str, _id: &str, _password: &[u8]) -> Result<()> {
        Err(HalError::unsupported("kill"))
    }

    fn supports_kill(&self) -> bool {
        false
    }

    /// Replace the identifier of tag `id`.
    async fn write_id(&mut self, _read_point: &str, _id: &str, _new_id: &str) -> Result<()> {
        Err(HalError::unsupported("writeId"))
    }

    fn supports_write_id(&self) -> bool {
        false
    }

    // Parameters.

    /// Get the names of all configuration parameters.
    fn all_parameter_names(&self) -> Result<Vec<String>> {
        Err(HalError::unsupported("getAllParameterNames"))
    }

    /// Get a configuration parameter by name.
    fn get_parameter(&self, _name: &str) -> Result<Option<String>> {
        Err(HalError::unsupported("getParameter"))
    }

    /// Set a configuration parameter.
    fn set_parameter(&mut self, _name: &str, _value: &str) -> Result<()> {
        Err(HalError::unsupported("setParameter"))
    }

    fn supports_parameters(&self) -> bool {
        false
    }

    // Lifecycle.

    /// Reset the controller.
    async fn reset(&mut self) -> Result<()> {
        Err(HalError::unsupported("reset"))
    }

    fn supports_reset(&self) -> bool {
        false
    }

    // Read points.

    async fn read_point_power_level(&mut self, _read_point: &str, _normalize: bool) -> Result<i32> {
        Err(HalError::unsupported("getReadPointPowerLevel"))
    }

    fn supports_get_read_point_power_level(&self) -> bool {
        false
    }

    async fn read_point_noise_level(&mut self, _read_point: &str, _normalize: bool) -> Result<i32> {
        Err(HalError::unsupported("getReadPointNoiseLevel"))
    }

    fn supports_get_read_point_noise_level(&self) -> bool {
        false
    }

    async fn start_up_read_point(&mut self, _read_point: &str) -> Result<()> {
        Err(HalError::unsupported("startUpReadPoint"))
    }

    fn supports_start_up_read_point(&self) -> bool {
        false
    }

    async fn shut_down_read_point(&mut self, _read_point: &str) -> Result<()> {
        Err(HalError::unsupported("shutDownReadPoint"))
    }

    fn supports_shut_down_read_point(&self) -> bool {
        false
    }

    /// Check whether read point `read_point` is ready.
    fn is_read_point_ready(&self, _read_point: &str) -> Result<bool> {
        Err(HalError::unsupported("isReadPointReady"))
    }

    fn supports_is_read_point_ready(&self) -> bool {
        false
    }
}

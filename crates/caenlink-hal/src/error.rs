//! Error types for hardware-abstraction operations.
//!
//! This module defines the errors a reader controller reports through the
//! HAL surface: unsupported operations, unknown read points, configuration
//! problems and transport failures.

use caenlink_network::ConnectorError;

/// Result type alias for HAL operations.
pub type Result<T> = std::result::Result<T, HalError>;

/// Errors that can occur during HAL operations.
#[derive(Debug, thiserror::Error)]
pub enum HalError {
    /// Operation is not supported by this controller.
    #[error("{operation}: Unsupported method")]
    UnsupportedOperation { operation: String },

    /// Read point name is not known to this controller.
    #[error("Read point not found: {name}")]
    ReadPointNotFound { name: String },

    /// Reader is not connected.
    #[error("Reader disconnected: {device}")]
    Disconnected { device: String },

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Transport error from the line connector.
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HalError {
    /// Create a new unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    /// Create a new read point not found error.
    pub fn read_point_not_found(name: impl Into<String>) -> Self {
        Self::ReadPointNotFound { name: name.into() }
    }

    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check whether this error only reports a missing capability.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedOperation { .. })
    }
}

//! Error types for opening a hub over nusb

use thiserror::Error;

/// Result type for transport setup
pub type Result<T> = std::result::Result<T, NusbError>;

/// Errors that can occur while finding and opening a hub
#[derive(Debug, Error)]
pub enum NusbError {
    /// No matching device on the bus
    #[error(
        "no USB device {vid:04x}:{} found",
        .pid.map_or_else(|| "*".to_string(), |p| format!("{:04x}", p))
    )]
    DeviceNotFound {
        /// Vendor ID searched for
        vid: u16,
        /// Product ID searched for, if any
        pid: Option<u16>,
    },
    /// Device enumeration failed
    #[error("failed to list USB devices: {0}")]
    ListFailed(String),
    /// Failed to open device
    #[error("failed to open hub: {0}")]
    OpenFailed(String),
    /// Failed to claim interface
    #[error("failed to claim interface: {0}")]
    ClaimFailed(String),
    /// Bad configuration option
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

use thiserror::Error;

/// Errors that can occur when decoding, recording or storing treadmill telemetry
#[derive(Error, Debug)]
pub enum FtmsError {
    /// Frame is shorter than its header or than the fields its flags declare
    #[error("Truncated frame: {actual} bytes, flags require {required}")]
    TruncatedFrame {
        /// Number of bytes the frame must contain
        required: usize,
        /// Number of bytes actually received
        actual: usize,
    },

    /// Nothing has been observed that is worth saving
    #[error("No workout data to save")]
    NoData,

    /// Bluetooth Low Energy related errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// No fitness machine found during scanning
    #[error("FTMS device not found")]
    DeviceNotFound,

    /// Device connection failed
    #[error("Failed to connect to device: {0}")]
    ConnectionFailed(String),

    /// Device disconnected unexpectedly
    #[error("Device disconnected")]
    Disconnected,

    /// Operation timeout
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Record store IO error
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV export error
    #[error("Export error: {0}")]
    Export(#[from] csv::Error),
}

/// Result type for FTMS operations
pub type Result<T> = std::result::Result<T, FtmsError>;

impl FtmsError {
    /// Check if this error came from decoding a single frame
    #[must_use]
    pub const fn is_decode_error(&self) -> bool {
        matches!(self, Self::TruncatedFrame { .. })
    }

    /// Check if this error indicates a connection issue
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Ble(_) | Self::ConnectionFailed(_) | Self::Disconnected | Self::DeviceNotFound
        )
    }

    /// Check if this error is recoverable
    ///
    /// Decode failures only affect the frame they came from, so recording
    /// continues with the next notification.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TruncatedFrame { .. } | Self::NoData | Self::Timeout { .. }
        )
    }
}

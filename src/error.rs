//! # Error Types
//!
//! Custom error types for SBUS Rover using `thiserror`.

use thiserror::Error;

/// Main error type for SBUS Rover
#[derive(Debug, Error)]
pub enum RoverError {
    /// SBUS protocol errors
    #[error("SBUS protocol error: {0}")]
    Sbus(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// No usable serial device
    #[error("Serial port not found (tried: {0})")]
    SerialPortNotFound(String),

    /// Actuator driver errors
    #[error("Actuator error: {0}")]
    Actuator(String),

    /// Calibration persistence errors
    #[error("Calibration store error: {0}")]
    CalibrationStore(String),
}

/// Result type alias for SBUS Rover
pub type Result<T> = std::result::Result<T, RoverError>;

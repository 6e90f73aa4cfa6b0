//! # Serial Communication Module
//!
//! Handles the serial link to the SBUS radio receiver.
//!
//! This module handles:
//! - Opening the UART at 100,000 baud, 8 data bits, even parity, 2 stop bits
//! - Reporting how many bytes are waiting
//! - Bounded-time reads so a control tick never stalls on the line

pub mod port_trait;

pub use port_trait::SerialSource;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_serial::{SerialPort, SerialPortBuilderExt};
use tracing::{debug, info, warn};

use crate::config::SerialConfig;
use crate::error::{Result, RoverError};

/// SBUS Serial Port Handler
///
/// Owns the UART connected to the receiver's SBUS output.
pub struct SbusSerial {
    /// Serial port handle
    port: tokio_serial::SerialStream,
    /// Device path (e.g., /dev/ttyS3)
    device_path: String,
}

impl std::fmt::Debug for SbusSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SbusSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl SbusSerial {
    /// Open the receiver port described by the configuration
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` if the device cannot be opened. The
    /// control loop cannot start without it.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sbus_rover::config::SerialConfig;
    /// use sbus_rover::serial::SbusSerial;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// # let rt = tokio::runtime::Runtime::new()?;
    /// # let _guard = rt.enter();
    /// let serial = SbusSerial::open(&SerialConfig::default())?;
    /// println!("Receiver on {}", serial.device_path());
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(config: &SerialConfig) -> Result<Self> {
        Self::open_with_paths(&[config.port.as_str()], config.baud_rate)
    }

    /// Open the first of `paths` that succeeds
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyS3"])
    /// * `baud_rate` - Line rate (100,000 for standard SBUS)
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened SBUS receiver at {} ({} baud, 8E2)", path, baud_rate);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(RoverError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with SBUS line settings
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::Even)
            .stop_bits(tokio_serial::StopBits::Two)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| RoverError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[async_trait]
impl SerialSource for SbusSerial {
    fn bytes_available(&self) -> io::Result<usize> {
        let count = self.port.bytes_to_read().map_err(io::Error::from)?;
        Ok(count as usize)
    }

    async fn read(&mut self, n: usize, timeout: Duration) -> io::Result<Bytes> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut buf = BytesMut::zeroed(n);
        let mut filled = 0;

        while filled < n {
            match tokio::time::timeout_at(deadline, self.port.read(&mut buf[filled..])).await {
                Ok(Ok(0)) => break,
                Ok(Ok(count)) => filled += count,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!("Serial read timed out with {}/{} bytes", filled, n);
                    break;
                }
            }
        }

        buf.truncate(filled);
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_with_invalid_paths_returns_error() {
        let invalid_paths = &["/dev/nonexistent0", "/dev/nonexistent1"];
        let result = SbusSerial::open_with_paths(invalid_paths, 100_000);

        match result {
            Err(RoverError::SerialPortNotFound(msg)) => {
                assert!(msg.contains("/dev/nonexistent0"));
                assert!(msg.contains("/dev/nonexistent1"));
            }
            other => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_with_empty_paths_returns_error() {
        let empty_paths: &[&str] = &[];
        match SbusSerial::open_with_paths(empty_paths, 100_000) {
            Err(RoverError::SerialPortNotFound(_)) => {}
            other => panic!("Expected SerialPortNotFound, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_port_with_invalid_path_returns_error() {
        let result = SbusSerial::open_port("/dev/nonexistent_serial_device_12345", 100_000);

        match result {
            Err(RoverError::Serial(msg)) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    // Integration test - only runs if a receiver is wired up
    #[tokio::test]
    #[ignore] // Run with: cargo test -- --ignored
    async fn test_read_with_real_hardware() {
        let config = SerialConfig::default();
        match SbusSerial::open(&config) {
            Ok(mut serial) => {
                let bytes = serial.read(25, Duration::from_millis(50)).await.unwrap();
                println!("Read {} bytes from {}", bytes.len(), serial.device_path());
            }
            Err(_) => println!("No SBUS receiver detected (this is OK for CI/CD)"),
        }
    }
}

//! Serial port transport implementation

use super::{Transport, TransportError, TransportType};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Serial port configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path (e.g., /dev/rfcomm0, /dev/ttyUSB0, COM3)
    pub device: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Write timeout in milliseconds
    pub write_timeout_ms: u64,
}

impl SerialConfig {
    /// Create a new serial configuration with default settings
    pub fn new(device: &str, baud_rate: u32) -> Self {
        Self {
            device: device.to_string(),
            baud_rate,
            write_timeout_ms: 1000,
        }
    }

    /// Set write timeout
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("/dev/rfcomm0", 115_200)
    }
}

/// Serial port transport
pub struct SerialTransport {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Create a new serial transport, the device is opened on `connect`
    pub fn new(config: SerialConfig) -> Self {
        Self { config, port: None }
    }

    /// Configuration in use
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

impl Transport for SerialTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        let port = serialport::new(&self.config.device, self.config.baud_rate)
            .timeout(Duration::from_millis(self.config.write_timeout_ms))
            .open()
            .map_err(|e| {
                TransportError::ConnectionUnavailable(format!("{}: {}", self.config.device, e))
            })?;

        self.port = Some(port);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.port.is_some()
    }

    fn read_nonblocking(&mut self) -> Result<Option<Bytes>, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;

        let waiting = port
            .bytes_to_read()
            .map_err(|e| TransportError::Io(e.into()))?;
        if waiting == 0 {
            return Ok(None);
        }

        let mut buffer = vec![0u8; waiting as usize];
        match port.read(&mut buffer) {
            Ok(0) => Ok(None),
            Ok(n) => {
                buffer.truncate(n);
                Ok(Some(Bytes::from(buffer)))
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;

        port.write_all(data).map_err(TransportError::from_write)?;
        port.flush().map_err(TransportError::from_write)?;
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(device = %self.config.device, "Serial port closed");
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Serial
    }

    fn connection_info(&self) -> String {
        format!("{} @ {} baud", self.config.device, self.config.baud_rate)
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::Io(e.into()))
}

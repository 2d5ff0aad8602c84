//! Transport layer for broadcaster connections
//!
//! Supports:
//! - Serial ports (RFCOMM Bluetooth serial, USB-Serial)
//! - TCP socket server serving a single client

mod serial;
mod socket;

pub use serial::{list_ports, SerialConfig, SerialTransport};
pub use socket::{SocketConfig, SocketTransport};

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// Serial port
    Serial,
    /// TCP socket
    Socket,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "Serial"),
            Self::Socket => write!(f, "Socket"),
        }
    }
}

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Open or accept failed or timed out
    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// Listening socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// Write timed out
    #[error("Write timeout")]
    Timeout,

    /// Peer closed the connection
    #[error("Disconnected")]
    Disconnected,

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Map a write-side I/O error, keeping timeouts distinct
    pub fn from_write(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            Self::Timeout
        } else {
            Self::Io(err)
        }
    }
}

/// Connection capability driven by a broadcaster
pub trait Transport: Send {
    /// Open the device or accept a client
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Whether a connection is open and writable
    fn is_ready(&self) -> bool;

    /// Read whatever inbound bytes are available without blocking
    ///
    /// Returns `Ok(None)` when nothing is pending.
    fn read_nonblocking(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Write a whole packet
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Close the current connection, if any
    fn close(&mut self);

    /// Get transport type
    fn transport_type(&self) -> TransportType;

    /// Get connection info string
    fn connection_info(&self) -> String;

    /// Whether inbound `!ALL` requests are honoured
    fn accepts_requests(&self) -> bool {
        false
    }
}

//! # nbpcast Core Library
//!
//! Broadcasts KPI (key performance indicator) updates to a single consumer
//! using the Numeric Broadcast Protocol (NBP), a small line-oriented text
//! protocol understood by data-logging apps.
//!
//! ## Features
//!
//! - Serial port transport (Bluetooth RFCOMM, USB-Serial)
//! - TCP socket transport with `!ALL` full-snapshot requests
//! - Incremental (UPDATE) and full (ALL) packets, plus metadata
//! - Rate gating and reconnection on transport failure
//! - Packet traffic log
//!
//! ## Example
//!
//! ```rust,no_run
//! use nbpcast_core::{
//!     payload_queue, Broadcaster, BroadcasterConfig, BroadcasterHandle, Kpi, PacketKind,
//!     Payload, SocketConfig, SocketTransport,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let (tx, rx) = payload_queue(None);
//!     let transport = SocketTransport::bind(SocketConfig::default())?;
//!     let broadcaster = Broadcaster::new(&BroadcasterConfig::new("MyCar"), transport);
//!     let mut handle = BroadcasterHandle::spawn(broadcaster, rx)?;
//!
//!     tx.send(Payload::now(PacketKind::Update, vec![Kpi::new("RPM", "rpm", 4500)]))?;
//!
//!     drop(tx);
//!     handle.wait();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::config::{AppConfig, ConfigError, LoggingConfig, QueueConfig};
pub use crate::core::broadcaster::{
    BroadcastStats, Broadcaster, BroadcasterConfig, BroadcasterHandle, ConnectionState, Step,
};
pub use crate::core::kpi::{Kpi, KpiValue, PacketKind, Payload};
pub use crate::core::logger::{LogFormat, PacketLog, PacketLogger};
pub use crate::core::packet::{encode, PacketEncoder, PacketError};
pub use crate::core::queue::{payload_queue, PayloadReceiver, PayloadSender};
pub use crate::core::state::{KpiTable, StateTracker};
pub use crate::core::transport::{
    SerialConfig, SerialTransport, SocketConfig, SocketTransport, Transport, TransportError,
    TransportType,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

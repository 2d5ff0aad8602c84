//! NBP packet encoding
//!
//! Wire format, UTF-8 text:
//!
//! ```text
//! @NAME:<device_name>\n\n                      metadata packet
//!
//! *<protocol_version>,<ALL|UPDATE>,<ts:.6>\n
//! "<name>","<unit>":<value>\n                  unit present
//! "<name>":<value>\n                           unit absent
//! #\n\n
//! ```

use super::kpi::{float_text, Kpi, PacketKind};
use super::state::KpiTable;
use bytes::Bytes;
use thiserror::Error;

/// Default protocol version token
pub const DEFAULT_PROTOCOL_VERSION: &str = "NBP1";

/// Prefix of the metadata packet
pub const METADATA_PREFIX: &str = "@NAME:";

/// Terminator of ALL / UPDATE packets
pub const PACKET_TERMINATOR: &str = "#\n\n";

/// Client request for an immediate full packet
pub const REQUEST_ALL: &str = "!ALL";

/// Packet encoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Packet kind string is not one of ALL, UPDATE, METADATA
    #[error("Unrecognized packet kind: {0}")]
    InvalidPacketKind(String),
}

/// Encoder holding the per-device packet parameters
#[derive(Debug, Clone)]
pub struct PacketEncoder {
    protocol_version: String,
    device_name: String,
}

impl PacketEncoder {
    /// Create a new encoder
    pub fn new(protocol_version: &str, device_name: &str) -> Self {
        Self {
            protocol_version: protocol_version.to_string(),
            device_name: device_name.to_string(),
        }
    }

    /// Protocol version token
    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    /// Device name announced in metadata packets
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Metadata packet
    pub fn metadata(&self) -> Bytes {
        Bytes::from(format!("{METADATA_PREFIX}{}\n\n", self.device_name))
    }

    /// Encode a packet of `kind` from the table and pending update names
    pub fn encode(
        &self,
        kind: PacketKind,
        timestamp: f64,
        table: &KpiTable,
        pending: &[String],
    ) -> Bytes {
        encode(
            kind,
            &self.protocol_version,
            &self.device_name,
            timestamp,
            table,
            pending,
        )
    }
}

impl Default for PacketEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_PROTOCOL_VERSION, "nbpcast")
    }
}

/// Encode a packet
///
/// `UPDATE` with no pending names selects the whole table, same as `ALL`.
pub fn encode(
    kind: PacketKind,
    protocol_version: &str,
    device_name: &str,
    timestamp: f64,
    table: &KpiTable,
    pending: &[String],
) -> Bytes {
    if kind == PacketKind::Metadata {
        return Bytes::from(format!("{METADATA_PREFIX}{device_name}\n\n"));
    }

    let mut packet = format!("*{protocol_version},{kind},{}\n", timestamp_text(timestamp));

    if kind == PacketKind::Update && !pending.is_empty() {
        for kpi in pending.iter().filter_map(|name| table.get(name)) {
            push_kpi(&mut packet, kpi);
        }
    } else {
        for kpi in table.iter() {
            push_kpi(&mut packet, kpi);
        }
    }

    packet.push_str(PACKET_TERMINATOR);
    Bytes::from(packet)
}

fn timestamp_text(timestamp: f64) -> String {
    if timestamp.is_finite() {
        format!("{timestamp:.6}")
    } else {
        float_text(timestamp)
    }
}

fn push_kpi(packet: &mut String, kpi: &Kpi) {
    if kpi.has_unit() {
        packet.push_str(&format!("\"{}\",\"{}\":{}\n", kpi.name, kpi.unit, kpi.value));
    } else {
        packet.push_str(&format!("\"{}\":{}\n", kpi.name, kpi.value));
    }
}

/// Whether inbound client text carries a full-packet request
pub fn is_full_request(text: &str) -> bool {
    text.trim() == REQUEST_ALL
}

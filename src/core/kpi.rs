//! KPI snapshots and the payloads that carry them
//!
//! A [`Payload`] is one timestamped batch of KPI updates together with the
//! packet kind the producer wants emitted for it.

use super::packet::PacketError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric KPI value
///
/// Integers and floats are kept apart so that each is rendered in its natural
/// text form on the wire (`4600` vs `14.7` / `4500.0`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KpiValue {
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
}

impl fmt::Display for KpiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => f.write_str(&float_text(*v)),
        }
    }
}

/// Wire text of a float
///
/// Shortest round-trip digits with a decimal point on integral values
/// (`4500.0`). Exponent form carries a sign and at least two digits
/// (`1e+16`, `1e-05`); non-finite values are `nan`, `inf` and `-inf`.
pub fn float_text(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    // Debug switches to exponent form at the same magnitudes (< 1e-4, >= 1e16)
    let text = format!("{v:?}");
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text,
    }
}

impl From<i64> for KpiValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for KpiValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for KpiValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for KpiValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// A named measurement with an optional unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kpi {
    /// KPI name, the identity key
    pub name: String,
    /// Unit, empty when the KPI has none
    #[serde(default)]
    pub unit: String,
    /// Current value
    pub value: KpiValue,
}

impl Kpi {
    /// Create a KPI with a unit
    pub fn new(name: &str, unit: &str, value: impl Into<KpiValue>) -> Self {
        Self {
            name: name.to_string(),
            unit: unit.to_string(),
            value: value.into(),
        }
    }

    /// Create a KPI without a unit
    pub fn unitless(name: &str, value: impl Into<KpiValue>) -> Self {
        Self::new(name, "", value)
    }

    /// Whether the KPI carries a unit
    pub fn has_unit(&self) -> bool {
        !self.unit.is_empty()
    }
}

/// Kind of packet requested for a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PacketKind {
    /// Full snapshot of every known KPI
    All,
    /// Only the KPIs changed since the last emission
    #[default]
    Update,
    /// Device identification only
    Metadata,
}

impl PacketKind {
    /// Wire token for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Update => "UPDATE",
            Self::Metadata => "METADATA",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PacketKind {
    type Err = PacketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALL" => Ok(Self::All),
            "UPDATE" => Ok(Self::Update),
            "METADATA" => Ok(Self::Metadata),
            other => Err(PacketError::InvalidPacketKind(other.to_string())),
        }
    }
}

/// One timestamped batch of KPI updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Seconds, wall clock
    pub timestamp: f64,
    /// Packet kind to emit for this payload
    pub packet_kind: PacketKind,
    /// KPIs in producer order
    pub kpis: Vec<Kpi>,
}

impl Payload {
    /// Create a payload
    pub fn new(timestamp: f64, packet_kind: PacketKind, kpis: Vec<Kpi>) -> Self {
        Self {
            timestamp,
            packet_kind,
            kpis,
        }
    }

    /// Create a payload stamped with the current wall-clock time
    pub fn now(packet_kind: PacketKind, kpis: Vec<Kpi>) -> Self {
        Self::new(now_seconds(), packet_kind, kpis)
    }
}

/// Current wall-clock time in seconds since the Unix epoch
#[allow(clippy::cast_precision_loss)]
pub fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_text_form() {
        assert_eq!(KpiValue::from(4600).to_string(), "4600");
        assert_eq!(KpiValue::from(14.7).to_string(), "14.7");
        assert_eq!(KpiValue::from(4500.0).to_string(), "4500.0");
        assert_eq!(KpiValue::from(-3).to_string(), "-3");
        assert_eq!(KpiValue::from(0.0001).to_string(), "0.0001");
        assert_eq!(KpiValue::from(1e15).to_string(), "1000000000000000.0");
    }

    #[test]
    fn test_value_exponent_and_non_finite_form() {
        assert_eq!(KpiValue::from(1e16).to_string(), "1e+16");
        assert_eq!(KpiValue::from(1.5e20).to_string(), "1.5e+20");
        assert_eq!(KpiValue::from(-2.5e100).to_string(), "-2.5e+100");
        assert_eq!(KpiValue::from(1e-5).to_string(), "1e-05");
        assert_eq!(KpiValue::from(f64::NAN).to_string(), "nan");
        assert_eq!(KpiValue::from(f64::INFINITY).to_string(), "inf");
        assert_eq!(KpiValue::from(f64::NEG_INFINITY).to_string(), "-inf");
    }

    #[test]
    fn test_value_from_json() {
        let int: KpiValue = serde_json::from_str("4500").unwrap();
        assert_eq!(int, KpiValue::Int(4500));
        let float: KpiValue = serde_json::from_str("14.7").unwrap();
        assert_eq!(float, KpiValue::Float(14.7));
    }

    #[test]
    fn test_kpi_unit_defaults_to_empty() {
        let kpi: Kpi = serde_json::from_str(r#"{"name":"AFR","value":14.7}"#).unwrap();
        assert!(!kpi.has_unit());
        assert_eq!(kpi, Kpi::unitless("AFR", 14.7));
    }

    #[test]
    fn test_packet_kind_parse() {
        assert_eq!("ALL".parse::<PacketKind>().unwrap(), PacketKind::All);
        assert_eq!("UPDATE".parse::<PacketKind>().unwrap(), PacketKind::Update);
        assert_eq!("METADATA".parse::<PacketKind>().unwrap(), PacketKind::Metadata);

        let err = "all".parse::<PacketKind>().unwrap_err();
        assert_eq!(err, PacketError::InvalidPacketKind("all".to_string()));
    }

    #[test]
    fn test_payload_now_is_recent() {
        let payload = Payload::now(PacketKind::All, Vec::new());
        assert!(payload.timestamp > 1_600_000_000.0);
    }
}

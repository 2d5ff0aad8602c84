//! Running KPI state absorbed from payloads

use super::kpi::{Kpi, PacketKind, Payload};
use super::packet::PacketEncoder;
use bytes::Bytes;
use std::collections::HashMap;

/// Latest value of every KPI ever seen, in first-insertion order
///
/// Entries are only ever added or overwritten.
#[derive(Debug, Clone, Default)]
pub struct KpiTable {
    entries: Vec<Kpi>,
    index: HashMap<String, usize>,
}

impl KpiTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite by name, returns `true` if the name was new
    pub fn upsert(&mut self, kpi: Kpi) -> bool {
        if let Some(&slot) = self.index.get(&kpi.name) {
            self.entries[slot] = kpi;
            false
        } else {
            self.index.insert(kpi.name.clone(), self.entries.len());
            self.entries.push(kpi);
            true
        }
    }

    /// Look up a KPI by name
    pub fn get(&self, name: &str) -> Option<&Kpi> {
        self.index.get(name).map(|&slot| &self.entries[slot])
    }

    /// Iterate in table order
    pub fn iter(&self) -> impl Iterator<Item = &Kpi> {
        self.entries.iter()
    }

    /// Number of known KPIs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no KPI is known yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Tracks the KPI table and the names changed since the last emission
#[derive(Debug, Clone, Default)]
pub struct StateTracker {
    table: KpiTable,
    pending: Vec<String>,
    timestamp: f64,
}

impl StateTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb a payload
    pub fn apply(&mut self, payload: &Payload) {
        for kpi in &payload.kpis {
            if !self.pending.iter().any(|name| name == &kpi.name) {
                self.pending.push(kpi.name.clone());
            }
            self.table.upsert(kpi.clone());
        }
        self.timestamp = payload.timestamp;
    }

    /// Clear the pending update names after a successful emission
    pub fn reset_pending(&mut self) {
        self.pending.clear();
    }

    /// Encode a packet from the current state
    pub fn encode(&self, kind: PacketKind, encoder: &PacketEncoder) -> Bytes {
        encoder.encode(kind, self.timestamp, &self.table, &self.pending)
    }

    /// KPI table
    pub fn table(&self) -> &KpiTable {
        &self.table
    }

    /// Look up a KPI by name
    pub fn get(&self, name: &str) -> Option<&Kpi> {
        self.table.get(name)
    }

    /// Names changed since the last emission, first-seen order
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// Timestamp of the most recent payload
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Number of known KPIs
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether no KPI is known yet
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kpi::KpiValue;

    fn update(timestamp: f64, kpis: Vec<Kpi>) -> Payload {
        Payload::new(timestamp, PacketKind::Update, kpis)
    }

    #[test]
    fn test_last_write_wins_merge() {
        let mut tracker = StateTracker::new();
        tracker.apply(&update(
            1.0,
            vec![Kpi::new("RPM", "rpm", 4500), Kpi::new("MAP", "kPa", 90)],
        ));
        tracker.apply(&update(
            2.0,
            vec![Kpi::unitless("AFR", 14.7), Kpi::new("RPM", "rpm", 4700)],
        ));
        tracker.apply(&update(3.0, vec![Kpi::new("MAP", "kPa", 95)]));

        let names: Vec<&str> = tracker.table().iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, ["RPM", "MAP", "AFR"]);
        assert_eq!(tracker.get("RPM").unwrap().value, KpiValue::Int(4700));
        assert_eq!(tracker.get("MAP").unwrap().value, KpiValue::Int(95));
        assert_eq!(tracker.pending(), ["RPM", "MAP", "AFR"]);
        assert!((tracker.timestamp() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pending_deduplicated_within_payload() {
        let mut tracker = StateTracker::new();
        tracker.apply(&update(
            1.0,
            vec![
                Kpi::new("RPM", "rpm", 4500),
                Kpi::new("RPM", "rpm", 4600),
                Kpi::unitless("AFR", 14.7),
            ],
        ));

        assert_eq!(tracker.pending(), ["RPM", "AFR"]);
        assert_eq!(tracker.len(), 2);

        let packet = tracker.encode(PacketKind::Update, &PacketEncoder::new("NBP1", "X"));
        let text = String::from_utf8(packet.to_vec()).unwrap();
        assert!(text.ends_with("\"RPM\",\"rpm\":4600\n\"AFR\":14.7\n#\n\n"));
        assert!(text.starts_with("*NBP1,UPDATE,1.000000\n"));
    }

    #[test]
    fn test_reset_then_update_emits_full_state() {
        let encoder = PacketEncoder::new("NBP1", "X");
        let mut tracker = StateTracker::new();
        tracker.apply(&update(1.0, vec![Kpi::new("RPM", "rpm", 4500), Kpi::unitless("AFR", 14.7)]));
        tracker.reset_pending();
        assert!(tracker.pending().is_empty());

        let update = tracker.encode(PacketKind::Update, &encoder);
        let all = tracker.encode(PacketKind::All, &encoder);
        let body = |p: &Bytes| {
            let text = String::from_utf8(p.to_vec()).unwrap();
            text.split_once('\n').unwrap().1.to_string()
        };
        assert_eq!(body(&update), body(&all));
    }

    #[test]
    fn test_table_never_shrinks() {
        let mut tracker = StateTracker::new();
        tracker.apply(&update(1.0, vec![Kpi::new("RPM", "rpm", 4500)]));
        tracker.apply(&update(2.0, Vec::new()));
        tracker.reset_pending();
        assert_eq!(tracker.len(), 1);
        assert!((tracker.timestamp() - 2.0).abs() < f64::EPSILON);
    }
}

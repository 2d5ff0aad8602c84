//! JSON-lines payload source
//!
//! Reads one payload per line and enqueues it for the broadcaster:
//!
//! ```text
//! {"timestamp": 12.5, "packet_kind": "UPDATE", "kpis": [{"name": "RPM", "value": 4500}]}
//! ```
//!
//! `timestamp` defaults to now, `packet_kind` to `UPDATE`, `unit` to empty.
//! Blank lines and `#` comments are skipped.

use crate::core::kpi::{now_seconds, Kpi, PacketKind, Payload};
use crate::core::packet::PacketError;
use crate::core::queue::PayloadSender;
use serde::Deserialize;
use std::io::BufRead;
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{debug, warn};

/// Payload input errors
#[derive(Error, Debug)]
pub enum InputError {
    /// Line is not a valid payload object
    #[error("Line {line}: {source}")]
    Json {
        /// 1-based line number
        line: usize,
        /// Parse error
        source: serde_json::Error,
    },

    /// Producer supplied an unknown packet kind
    #[error("Line {line}: {source}")]
    Packet {
        /// 1-based line number
        line: usize,
        /// Encoding contract error
        source: PacketError,
    },

    /// Reading input failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Broadcaster is gone
    #[error("Payload queue closed")]
    QueueClosed,
}

/// Input statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputStats {
    /// Payloads enqueued
    pub enqueued: usize,
    /// Malformed lines skipped
    pub skipped: usize,
}

#[derive(Deserialize)]
struct RawPayload {
    timestamp: Option<f64>,
    packet_kind: Option<String>,
    #[serde(default)]
    kpis: Vec<Kpi>,
}

/// Parse a single input line, `Ok(None)` for blank and comment lines
pub fn parse_line(text: &str, line: usize) -> Result<Option<Payload>, InputError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let raw: RawPayload =
        serde_json::from_str(trimmed).map_err(|source| InputError::Json { line, source })?;

    let packet_kind = match raw.packet_kind {
        Some(kind) => kind
            .parse::<PacketKind>()
            .map_err(|source| InputError::Packet { line, source })?,
        None => PacketKind::Update,
    };

    Ok(Some(Payload::new(
        raw.timestamp.unwrap_or_else(now_seconds),
        packet_kind,
        raw.kpis,
    )))
}

/// Read payloads until EOF and enqueue them
///
/// Malformed lines are logged and skipped. An unknown packet kind stops the
/// pump with an error.
pub fn pump<R: BufRead>(reader: R, sender: &PayloadSender) -> Result<InputStats, InputError> {
    let mut stats = InputStats::default();

    for (index, text) in reader.lines().enumerate() {
        let text = text?;
        match parse_line(&text, index + 1) {
            Ok(Some(payload)) => {
                sender.send(payload).map_err(|_| InputError::QueueClosed)?;
                stats.enqueued += 1;
            }
            Ok(None) => {}
            Err(e @ InputError::Json { .. }) => {
                warn!("Skipping payload: {}", e);
                stats.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    debug!("Input finished: {} enqueued, {} skipped", stats.enqueued, stats.skipped);
    Ok(stats)
}

/// Collect the result of a finished input thread
///
/// After a cancel the thread may still be blocked on stdin and is left
/// behind. Otherwise the queue closed on its own and the thread is joined,
/// so a producer error always reaches the caller. `QueueClosed` is not an
/// error here since the broadcaster ending first is what closes the queue.
pub fn finish_input(
    producer: JoinHandle<anyhow::Result<()>>,
    cancelled: bool,
) -> anyhow::Result<()> {
    if cancelled && !producer.is_finished() {
        debug!("Input thread still blocked, not joining");
        return Ok(());
    }

    match producer.join() {
        Ok(Err(e)) if matches!(e.downcast_ref::<InputError>(), Some(InputError::QueueClosed)) => {
            Ok(())
        }
        Ok(result) => result,
        Err(_) => anyhow::bail!("Input thread panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kpi::KpiValue;
    use crate::core::queue::payload_queue;
    use std::io::Cursor;

    #[test]
    fn test_parse_full_line() {
        let payload = parse_line(
            concat!(
                r#"{"timestamp": 12.5, "packet_kind": "ALL", "kpis": ["#,
                r#"{"name": "RPM", "unit": "rpm", "value": 4500}, "#,
                r#"{"name": "AFR", "value": 14.7}]}"#,
            ),
            1,
        )
        .unwrap()
        .unwrap();

        assert!((payload.timestamp - 12.5).abs() < f64::EPSILON);
        assert_eq!(payload.packet_kind, PacketKind::All);
        assert_eq!(payload.kpis[0], Kpi::new("RPM", "rpm", 4500));
        assert_eq!(payload.kpis[1].value, KpiValue::Float(14.7));
        assert!(payload.kpis[1].unit.is_empty());
    }

    #[test]
    fn test_parse_defaults() {
        let payload = parse_line(r#"{"kpis": [{"name": "A", "value": 1}]}"#, 1)
            .unwrap()
            .unwrap();
        assert_eq!(payload.packet_kind, PacketKind::Update);
        assert!(payload.timestamp > 0.0);
    }

    #[test]
    fn test_skip_blank_and_comments() {
        assert!(parse_line("", 1).unwrap().is_none());
        assert!(parse_line("   # session start", 2).unwrap().is_none());
    }

    #[test]
    fn test_invalid_kind() {
        let err = parse_line(r#"{"packet_kind": "DELTA"}"#, 7).unwrap_err();
        match err {
            InputError::Packet { line, source } => {
                assert_eq!(line, 7);
                assert_eq!(source, PacketError::InvalidPacketKind("DELTA".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_pump_skips_malformed_lines() {
        let input = "{\"timestamp\": 1.0, \"kpis\": []}\nnot json\n\n{\"timestamp\": 2.0}\n";
        let (tx, rx) = payload_queue(None);

        let stats = pump(Cursor::new(input), &tx).unwrap();
        assert_eq!(stats, InputStats { enqueued: 2, skipped: 1 });

        drop(tx);
        let stamps: Vec<f64> = rx.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![1.0, 2.0]);
    }

    #[test]
    fn test_pump_stops_on_invalid_kind() {
        let input = "{\"packet_kind\": \"ALL\"}\n{\"packet_kind\": \"BOGUS\"}\n{}\n";
        let (tx, rx) = payload_queue(None);

        let err = pump(Cursor::new(input), &tx).unwrap_err();
        assert!(matches!(err, InputError::Packet { line: 2, .. }));
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_finish_input_reports_producer_error() {
        let (tx, _rx) = payload_queue(None);
        let producer = std::thread::spawn(move || -> anyhow::Result<()> {
            // Give the caller a chance to reach the join first
            std::thread::sleep(std::time::Duration::from_millis(50));
            pump(Cursor::new("{\"packet_kind\": \"BOGUS\"}\n"), &tx)?;
            Ok(())
        });

        let err = finish_input(producer, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InputError>(),
            Some(InputError::Packet { line: 1, .. })
        ));
    }

    #[test]
    fn test_finish_input_ignores_closed_queue() {
        let producer = std::thread::spawn(|| -> anyhow::Result<()> {
            Err(InputError::QueueClosed.into())
        });
        assert!(finish_input(producer, false).is_ok());
    }

    #[test]
    fn test_finish_input_leaves_blocked_thread_after_cancel() {
        let (release, blocked) = crossbeam_channel::bounded::<()>(0);
        let producer = std::thread::spawn(move || -> anyhow::Result<()> {
            let _ = blocked.recv();
            Ok(())
        });

        assert!(finish_input(producer, true).is_ok());
        drop(release);
    }

    #[test]
    fn test_pump_queue_closed() {
        let (tx, rx) = payload_queue(None);
        drop(rx);
        let err = pump(Cursor::new("{}\n"), &tx).unwrap_err();
        assert!(matches!(err, InputError::QueueClosed));
    }
}

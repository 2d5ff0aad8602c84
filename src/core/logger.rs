//! Packet traffic log
//!
//! Records sent packets, received client bytes and connection notes with
//! timestamps, to a file and to a bounded in-memory buffer.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared handle injected into broadcasters
pub type PacketLogger = Arc<Mutex<PacketLog>>;

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Plain text
    #[default]
    Text,
    /// JSON lines
    JsonLines,
}

impl LogFormat {
    /// Get file extension for format
    pub fn extension(&self) -> &'static str {
        match self {
            LogFormat::Text => "log",
            LogFormat::JsonLines => "jsonl",
        }
    }
}

/// Data direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    /// Bytes received from the client
    Received,
    /// Packet sent to the client
    Sent,
    /// Connection note
    Info,
}

/// A single log entry
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    /// Local time the entry was recorded
    pub timestamp: DateTime<Local>,
    /// Traffic direction
    pub direction: Direction,
    /// Raw bytes (or note text)
    pub data: Vec<u8>,
}

impl LogEntry {
    /// Create new entry
    pub fn new(direction: Direction, data: Vec<u8>) -> Self {
        Self {
            timestamp: Local::now(),
            direction,
            data,
        }
    }

    /// Format as text
    pub fn to_text(&self, show_timestamp: bool) -> String {
        let dir = match self.direction {
            Direction::Received => "RX",
            Direction::Sent => "TX",
            Direction::Info => "##",
        };

        let text = String::from_utf8_lossy(&self.data);

        if show_timestamp {
            format!(
                "[{}] {} {}",
                self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                dir,
                text.trim_end()
            )
        } else {
            format!("{} {}", dir, text.trim_end())
        }
    }

    /// Format as JSON line
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "timestamp": self.timestamp.to_rfc3339(),
            "direction": self.direction,
            "text": String::from_utf8_lossy(&self.data),
        })
        .to_string()
    }
}

/// Packet traffic log
pub struct PacketLog {
    file: Option<BufWriter<File>>,
    format: LogFormat,
    path: Option<PathBuf>,
    timestamps: bool,
    buffer: VecDeque<LogEntry>,
    max_buffer: usize,
    entries_logged: usize,
}

impl Default for PacketLog {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketLog {
    /// Create new log (memory only until `start`)
    pub fn new() -> Self {
        Self {
            file: None,
            format: LogFormat::Text,
            path: None,
            timestamps: true,
            buffer: VecDeque::new(),
            max_buffer: 1000,
            entries_logged: 0,
        }
    }

    /// Wrap into a shared handle
    pub fn shared(self) -> PacketLogger {
        Arc::new(Mutex::new(self))
    }

    /// Start appending to a file
    ///
    /// An existing directory gets a new timestamped file inside it.
    pub fn start(&mut self, path: &Path, format: LogFormat) -> std::io::Result<()> {
        let path = if path.is_dir() {
            path.join(generate_log_filename("packets", format))
        } else {
            path.to_path_buf()
        };
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        self.file = Some(BufWriter::new(file));
        self.format = format;
        self.path = Some(path);
        Ok(())
    }

    /// Stop logging to file
    pub fn stop(&mut self) {
        if let Some(ref mut file) = self.file {
            let _ = file.flush();
        }
        self.file = None;
    }

    /// Is currently logging to a file
    pub fn is_logging(&self) -> bool {
        self.file.is_some()
    }

    /// Get log path
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Log data
    pub fn log(&mut self, direction: Direction, data: &[u8]) {
        let entry = LogEntry::new(direction, data.to_vec());

        if let Some(ref mut file) = self.file {
            let line = match self.format {
                LogFormat::Text => entry.to_text(self.timestamps),
                LogFormat::JsonLines => entry.to_json(),
            };
            let _ = writeln!(file, "{line}");
            // Packets are infrequent, keep the file current
            let _ = file.flush();
        }
        self.entries_logged += 1;

        self.buffer.push_back(entry);
        while self.buffer.len() > self.max_buffer {
            self.buffer.pop_front();
        }
    }

    /// Log a sent packet
    pub fn log_tx(&mut self, data: &[u8]) {
        self.log(Direction::Sent, data);
    }

    /// Log received bytes
    pub fn log_rx(&mut self, data: &[u8]) {
        self.log(Direction::Received, data);
    }

    /// Log info message
    pub fn log_info(&mut self, message: &str) {
        self.log(Direction::Info, message.as_bytes());
    }

    /// Buffered entries, oldest first
    pub fn buffer(&self) -> impl Iterator<Item = &LogEntry> {
        self.buffer.iter()
    }

    /// Buffered entries in one direction
    pub fn entries(&self, direction: Direction) -> Vec<&LogEntry> {
        self.buffer.iter().filter(|e| e.direction == direction).collect()
    }

    /// Total entries logged
    pub fn entries_logged(&self) -> usize {
        self.entries_logged
    }

    /// Set timestamp display
    pub fn set_timestamps(&mut self, show: bool) {
        self.timestamps = show;
    }

    /// Set max buffer size
    pub fn set_max_buffer(&mut self, size: usize) {
        self.max_buffer = size;
    }
}

impl Drop for PacketLog {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Generate log filename with timestamp
pub fn generate_log_filename(prefix: &str, format: LogFormat) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("{}_{}.{}", prefix, timestamp, format.extension())
}

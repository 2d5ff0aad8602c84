//! Broadcaster loop driving a transport
//!
//! One broadcaster owns one transport, one state tracker and the rate-gate
//! clock. Each dequeued payload runs one iteration:
//!
//! 1. merge the payload into the state tracker
//! 2. connect (open the device / accept a client) if needed
//! 3. drain inbound bytes, serving `!ALL` requests where supported
//! 4. skip sending if the rate gate is closed
//! 5. encode, write, clear the pending set
//!
//! Transport failures close the connection and the next payload retries.

use super::kpi::{PacketKind, Payload};
use super::logger::PacketLogger;
use super::packet::{is_full_request, PacketEncoder, DEFAULT_PROTOCOL_VERSION};
use super::queue::PayloadReceiver;
use super::state::StateTracker;
use super::transport::{Transport, TransportError};
use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often a waiting loop re-checks its running flag
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Broadcaster parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcasterConfig {
    /// Name announced in metadata packets
    pub device_name: String,
    /// Protocol version token in packet headers
    pub protocol_version: String,
    /// Minimum seconds between emissions
    pub min_update_interval: f64,
}

impl BroadcasterConfig {
    /// Create a configuration with default protocol and interval
    pub fn new(device_name: &str) -> Self {
        Self {
            device_name: device_name.to_string(),
            ..Self::default()
        }
    }

    /// Set minimum interval between emissions
    #[must_use]
    pub fn min_update_interval(mut self, interval: Duration) -> Self {
        self.min_update_interval = interval.as_secs_f64();
        self
    }

    /// Set protocol version token
    #[must_use]
    pub fn protocol_version(mut self, version: &str) -> Self {
        self.protocol_version = version.to_string();
        self
    }

    /// Rate-gate interval, negative or invalid values disable the gate
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.min_update_interval).unwrap_or(Duration::ZERO)
    }
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            device_name: "nbpcast".to_string(),
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            min_update_interval: 0.2,
        }
    }
}

/// Connection state of a broadcaster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No open device / listening without a client
    Disconnected,
    /// Device open / client connected
    Connected,
}

/// Outcome of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// No connection, state merged for later
    NotConnected,
    /// Rate gate closed, state merged for later
    RateLimited,
    /// Packet of this many bytes written
    Sent(usize),
    /// Transport failed, connection closed
    Failed,
}

/// Broadcaster statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Payloads dequeued
    pub payloads: u64,
    /// Packets written, including `!ALL` responses
    pub packets_sent: u64,
    /// Bytes written
    pub bytes_sent: u64,
    /// Emissions skipped by the rate gate
    pub rate_limited: u64,
    /// `!ALL` requests served
    pub full_requests: u64,
    /// Successful connects
    pub connects: u64,
    /// Connections closed after a failure
    pub disconnects: u64,
}

/// Broadcaster over a transport
pub struct Broadcaster<T: Transport> {
    transport: T,
    tracker: StateTracker,
    encoder: PacketEncoder,
    interval: Duration,
    last_emission: Option<Instant>,
    stats: Arc<Mutex<BroadcastStats>>,
    packet_log: Option<PacketLogger>,
}

impl<T: Transport> Broadcaster<T> {
    /// Create a new broadcaster
    pub fn new(config: &BroadcasterConfig, transport: T) -> Self {
        Self {
            transport,
            tracker: StateTracker::new(),
            encoder: PacketEncoder::new(&config.protocol_version, &config.device_name),
            interval: config.interval(),
            last_emission: None,
            stats: Arc::new(Mutex::new(BroadcastStats::default())),
            packet_log: None,
        }
    }

    /// Record traffic into a packet log
    #[must_use]
    pub fn with_packet_log(mut self, log: PacketLogger) -> Self {
        self.packet_log = Some(log);
        self
    }

    /// State tracker
    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    /// Transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        if self.transport.is_ready() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Get statistics
    pub fn stats(&self) -> BroadcastStats {
        self.stats.lock().clone()
    }

    /// Shared statistics handle
    pub fn stats_handle(&self) -> Arc<Mutex<BroadcastStats>> {
        self.stats.clone()
    }

    /// Run one iteration for a payload now
    pub fn process(&mut self, payload: Payload) -> Step {
        self.process_at(payload, Instant::now())
    }

    /// Run one iteration for a payload at `now`
    pub fn process_at(&mut self, payload: Payload, now: Instant) -> Step {
        self.stats.lock().payloads += 1;
        self.tracker.apply(&payload);

        if !self.transport.is_ready() {
            match self.transport.connect() {
                Ok(()) => {
                    info!(
                        transport = %self.transport.transport_type(),
                        "Connected: {}",
                        self.transport.connection_info()
                    );
                    self.stats.lock().connects += 1;
                    self.note(&format!("connected {}", self.transport.connection_info()));
                }
                Err(e) => {
                    debug!(
                        transport = %self.transport.transport_type(),
                        "Connection not open - waiting for connection ({})",
                        e
                    );
                    return Step::NotConnected;
                }
            }
        }

        if !self.transport.is_ready() {
            return Step::NotConnected;
        }

        match self.transport.read_nonblocking() {
            Ok(Some(data)) => {
                if let Err(e) = self.handle_inbound(&data) {
                    self.fail(&e);
                    return Step::Failed;
                }
            }
            Ok(None) => {}
            Err(TransportError::Disconnected) => {
                self.fail(&TransportError::Disconnected);
                return Step::Failed;
            }
            Err(e) => debug!("Inbound read failed: {}", e),
        }

        if let Some(last) = self.last_emission {
            if now.saturating_duration_since(last) < self.interval {
                debug!("Rate gate closed, holding {} pending", self.tracker.pending().len());
                self.stats.lock().rate_limited += 1;
                return Step::RateLimited;
            }
        }

        let packet = self.tracker.encode(payload.packet_kind, &self.encoder);
        debug!("{}", String::from_utf8_lossy(&packet));

        match self.send(&packet) {
            Ok(()) => {
                self.tracker.reset_pending();
                self.last_emission = Some(now);
                Step::Sent(packet.len())
            }
            Err(e) => {
                self.fail(&e);
                Step::Failed
            }
        }
    }

    /// Run until the queue closes or `running` is cleared
    pub fn run(&mut self, receiver: &PayloadReceiver, running: &AtomicBool) {
        info!(
            transport = %self.transport.transport_type(),
            "Broadcaster started: {}",
            self.transport.connection_info()
        );

        while running.load(Ordering::Relaxed) {
            match receiver.recv_timeout(QUEUE_POLL_INTERVAL) {
                Ok(payload) => {
                    self.process(payload);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Payload queue closed");
                    break;
                }
            }
        }

        self.transport.close();
        info!(transport = %self.transport.transport_type(), "Broadcaster stopped");
    }

    fn handle_inbound(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let text = String::from_utf8_lossy(data);
        info!("Received: {}", text.trim());
        if let Some(log) = &self.packet_log {
            log.lock().log_rx(data);
        }

        if self.transport.accepts_requests() && is_full_request(&text) {
            info!("ALL packet requested, sending");
            let packet = self.tracker.encode(PacketKind::All, &self.encoder);
            self.send(&packet)?;
            self.stats.lock().full_requests += 1;
        }
        Ok(())
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        self.transport.write(packet)?;

        if let Some(log) = &self.packet_log {
            log.lock().log_tx(packet);
        }
        let mut stats = self.stats.lock();
        stats.packets_sent += 1;
        stats.bytes_sent += packet.len() as u64;
        Ok(())
    }

    fn fail(&mut self, err: &TransportError) {
        warn!(
            transport = %self.transport.transport_type(),
            "Write failed, closing connection: {}",
            err
        );
        self.transport.close();
        self.stats.lock().disconnects += 1;
        self.note(&format!("closed after failure: {err}"));
    }

    fn note(&self, message: &str) {
        if let Some(log) = &self.packet_log {
            log.lock().log_info(message);
        }
    }
}

/// Broadcaster running on its own thread
pub struct BroadcasterHandle {
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<BroadcastStats>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl BroadcasterHandle {
    /// Spawn the broadcaster loop on a dedicated thread
    pub fn spawn<T: Transport + 'static>(
        mut broadcaster: Broadcaster<T>,
        receiver: PayloadReceiver,
    ) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let stats = broadcaster.stats_handle();
        let name = format!(
            "nbp-{}",
            broadcaster.transport().transport_type().to_string().to_lowercase()
        );

        let flag = running.clone();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || broadcaster.run(&receiver, &flag))?;

        Ok(Self {
            running,
            stats,
            handle: Some(handle),
        })
    }

    /// Running flag, clearing it stops the loop
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Is running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Get statistics
    pub fn stats(&self) -> BroadcastStats {
        self.stats.lock().clone()
    }

    /// Wait for the loop to end on its own (queue closed or flag cleared)
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Broadcaster thread panicked");
            }
        }
    }

    /// Stop the loop and join the thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.wait();
    }
}

impl Drop for BroadcasterHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

//! TCP socket transport implementation
//!
//! Listens on a single address and serves one client at a time. A new
//! client is only accepted after the previous one has been closed.

use super::{Transport, TransportError, TransportType};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);
const READ_BUFFER_SIZE: usize = 1024;

/// Socket server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Address to bind
    pub ip: String,
    /// Port to listen on
    pub port: u16,
    /// Accept timeout in milliseconds
    pub accept_timeout_ms: u64,
}

impl SocketConfig {
    /// Create a new socket configuration
    pub fn new(ip: &str, port: u16) -> Self {
        Self {
            ip: ip.to_string(),
            port,
            accept_timeout_ms: 1000,
        }
    }

    /// Set accept timeout
    #[must_use]
    pub fn accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// `ip:port` string
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 35000)
    }
}

/// TCP socket transport
pub struct SocketTransport {
    config: SocketConfig,
    listener: TcpListener,
    client: Option<(TcpStream, SocketAddr)>,
}

impl SocketTransport {
    /// Bind and listen on the configured address
    pub fn bind(config: SocketConfig) -> Result<Self, TransportError> {
        let addr = config.address();
        info!("Binding to {}", addr);

        let listener = TcpListener::bind((config.ip.as_str(), config.port))
            .map_err(|source| TransportError::Bind {
                addr: addr.clone(),
                source,
            })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::Bind { addr, source })?;

        Ok(Self {
            config,
            listener,
            client: None,
        })
    }

    /// Address actually bound, useful with port 0
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Address of the connected client
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.client.as_ref().map(|(_, addr)| *addr)
    }

    fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.config.accept_timeout_ms)
    }
}

impl Transport for SocketTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        let deadline = Instant::now() + self.accept_timeout();

        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    stream.set_nonblocking(true)?;
                    stream.set_nodelay(true).ok();
                    info!("Connection from {} open", addr);
                    self.client = Some((stream, addr));
                    return Ok(());
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(TransportError::ConnectionUnavailable(format!(
                            "no client on {} within {} ms",
                            self.config.address(),
                            self.config.accept_timeout_ms
                        )));
                    }
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => return Err(TransportError::ConnectionUnavailable(e.to_string())),
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.client.is_some()
    }

    fn read_nonblocking(&mut self) -> Result<Option<Bytes>, TransportError> {
        let (stream, _) = self.client.as_mut().ok_or(TransportError::NotConnected)?;

        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        match stream.read(&mut buffer) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => {
                buffer.truncate(n);
                Ok(Some(Bytes::from(buffer)))
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let (stream, _) = self.client.as_mut().ok_or(TransportError::NotConnected)?;

        stream.write_all(data).map_err(TransportError::from_write)?;
        stream.flush().map_err(TransportError::from_write)?;
        Ok(())
    }

    fn close(&mut self) {
        if let Some((stream, addr)) = self.client.take() {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                warn!("Shutdown of {} failed: {}", addr, e);
            }
            info!("Connection from {} closed", addr);
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Socket
    }

    fn connection_info(&self) -> String {
        match self.peer_addr() {
            Some(peer) => format!("{} <- {}", self.config.address(), peer),
            None => self.config.address(),
        }
    }

    fn accepts_requests(&self) -> bool {
        true
    }
}

// UDP Transport Implementation
// One datagram per frame, with optional sequence numbering and redundant sends

use crate::transport::binding::TransportDevice;
use crate::transport::shared::TransportCore;
use crate::transport::sequence::{SequenceCounter, SequenceFilter};
use crate::transport::supervisor::{Connector, LinkCommand, LinkHandle, SupervisorHandle};
use crate::transport::traits::StatCounters;
use crate::transport::{Transport, TransportConfig, TransportError, TransportStats};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Largest payload an IPv4 UDP datagram can carry
pub const MAX_UDP_PAYLOAD: usize = 65_507;

// ============================================================================
// UDP TRANSPORT CONFIG
// ============================================================================

/// Configuration for UDP transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpTransportConfig {
    /// Base transport configuration
    pub base: TransportConfig,
    /// Peer host name or address
    pub host: String,
    /// Peer port
    pub port: u16,
    /// Local address to bind
    pub bind_address: String,
    /// Local port to bind (0 for random)
    pub bind_port: u16,
    /// Prefix frames with a one-byte sequence number
    pub sequence_mode: bool,
    /// Copies of each frame sent in sequence mode
    pub redundancy: u8,
    /// Largest datagram accepted; longer ones are dropped whole
    pub max_datagram_size: usize,
}

impl Default for UdpTransportConfig {
    fn default() -> Self {
        Self {
            base: TransportConfig::default(),
            host: "127.0.0.1".to_string(),
            port: 0,
            bind_address: "0.0.0.0".to_string(),
            bind_port: 0,
            sequence_mode: false,
            redundancy: 5,
            max_datagram_size: MAX_UDP_PAYLOAD,
        }
    }
}

impl UdpTransportConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Self::default()
        }
    }

    pub fn with_base_config(mut self, base: TransportConfig) -> Self {
        self.base = base;
        self
    }

    pub fn with_bind_address(mut self, addr: &str) -> Self {
        self.bind_address = addr.to_string();
        self
    }

    pub fn with_bind_port(mut self, port: u16) -> Self {
        self.bind_port = port;
        self
    }

    pub fn with_sequence_mode(mut self, enabled: bool) -> Self {
        self.sequence_mode = enabled;
        self
    }

    pub fn with_redundancy(mut self, copies: u8) -> Self {
        self.redundancy = copies;
        self
    }

    pub fn with_max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size;
        self
    }

    pub fn peer_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn local_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.bind_port)
    }

    /// Copies actually sent per frame
    pub fn copies(&self) -> u8 {
        if self.sequence_mode {
            self.redundancy
        } else {
            1
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), TransportError> {
        self.base.validate()?;
        if self.host.is_empty() {
            return Err(TransportError::InvalidConfig("host cannot be empty".to_string()));
        }
        if self.port == 0 {
            return Err(TransportError::InvalidConfig("port cannot be 0".to_string()));
        }
        if self.sequence_mode && self.redundancy == 0 {
            return Err(TransportError::InvalidConfig(
                "redundancy must be at least 1".to_string(),
            ));
        }
        if self.max_datagram_size == 0 || self.max_datagram_size > MAX_UDP_PAYLOAD {
            return Err(TransportError::InvalidConfig(format!(
                "max_datagram_size must be in 1..={}",
                MAX_UDP_PAYLOAD
            )));
        }
        Ok(())
    }
}

// ============================================================================
// CONNECTOR
// ============================================================================

#[derive(Debug)]
struct UdpEndpoint {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

#[derive(Debug)]
struct UdpConnector {
    config: UdpTransportConfig,
    endpoint: RwLock<Option<UdpEndpoint>>,
}

#[async_trait]
impl Connector for UdpConnector {
    async fn open(&self, link: LinkHandle) -> Result<JoinHandle<()>, TransportError> {
        let peer = lookup_host(self.config.peer_address())
            .await
            .map_err(|e| TransportError::InvalidAddress(e.to_string()))?
            .next()
            .ok_or_else(|| TransportError::InvalidAddress(self.config.peer_address()))?;

        let socket = UdpSocket::bind(self.config.local_address())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let socket = Arc::new(socket);

        *self.endpoint.write().await = Some(UdpEndpoint {
            socket: socket.clone(),
            peer,
        });

        let session = UdpSession {
            link,
            socket,
            sequence_mode: self.config.sequence_mode,
            filter: SequenceFilter::new(),
            max_datagram_size: self.config.max_datagram_size,
            buffer: vec![0u8; self.config.max_datagram_size + 1],
        };
        Ok(tokio::spawn(session.run()))
    }

    async fn close(&self) {
        self.endpoint.write().await.take();
    }
}

/// Receive loop for one bound socket
struct UdpSession {
    link: LinkHandle,
    socket: Arc<UdpSocket>,
    sequence_mode: bool,
    filter: SequenceFilter,
    max_datagram_size: usize,
    // One byte of headroom exposes datagrams the OS would truncate
    buffer: Vec<u8>,
}

impl UdpSession {
    async fn run(mut self) {
        loop {
            match self.socket.recv_from(&mut self.buffer).await {
                Ok((len, from)) if len > self.max_datagram_size => {
                    let core = self.link.core();
                    StatCounters::bump(&core.stats.dropped_datagrams);
                    debug!(
                        transport = %core.name(),
                        %from,
                        limit = self.max_datagram_size,
                        "oversized datagram dropped"
                    );
                }
                Ok((len, from)) => {
                    let datagram = Bytes::copy_from_slice(&self.buffer[..len]);
                    self.handle(datagram, from);
                }
                Err(e) => {
                    self.link.closed(e.to_string());
                    return;
                }
            }
        }
    }

    fn handle(&mut self, datagram: Bytes, from: SocketAddr) {
        let core = self.link.core();
        if datagram.is_empty() {
            StatCounters::bump(&core.stats.dropped_datagrams);
            trace!(transport = %core.name(), %from, "empty datagram ignored");
            return;
        }

        let frame = if self.sequence_mode {
            let sequence = datagram[0];
            if !self.filter.accept(sequence) {
                StatCounters::bump(&core.stats.dropped_datagrams);
                trace!(
                    transport = %core.name(),
                    sequence,
                    watermark = ?self.filter.watermark(),
                    "stale datagram dropped"
                );
                return;
            }
            datagram.slice(1..)
        } else {
            datagram
        };

        debug!(transport = %core.name(), %from, frame = %hex::encode(&frame), "frame received");
        self.link.deliver(frame);
    }
}

// ============================================================================
// UDP TRANSPORT
// ============================================================================

/// UDP transport; "connected" means the local socket is bound
#[derive(Debug)]
pub struct UdpTransport {
    core: Arc<TransportCore>,
    connector: Arc<UdpConnector>,
    sequence: SequenceCounter,
    supervisor: OnceLock<SupervisorHandle>,
}

impl UdpTransport {
    pub fn new(config: UdpTransportConfig) -> Result<Self, TransportError> {
        config.validate()?;
        Ok(Self {
            core: Arc::new(TransportCore::new(config.base.clone())),
            connector: Arc::new(UdpConnector {
                config,
                endpoint: RwLock::new(None),
            }),
            sequence: SequenceCounter::new(),
            supervisor: OnceLock::new(),
        })
    }

    pub fn config(&self) -> &UdpTransportConfig {
        &self.connector.config
    }

    /// Locally bound address while connected
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let endpoint = self.connector.endpoint.read().await;
        endpoint.as_ref().and_then(|e| e.socket.local_addr().ok())
    }

    pub fn device_count(&self) -> usize {
        self.core.device_count()
    }

    fn command(&self, command: LinkCommand) {
        self.supervisor
            .get_or_init(|| SupervisorHandle::spawn(self.core.clone(), self.connector.clone()))
            .send(command);
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn add_device(&self, binding: Arc<TransportDevice>) -> Result<(), TransportError> {
        self.core.add_device(binding)
    }

    fn connect(&self) {
        self.core.set_desired(true);
        self.command(LinkCommand::Reconcile);
    }

    fn disconnect(&self) {
        self.core.set_desired(false);
        self.command(LinkCommand::Reconcile);
    }

    fn reconnect(&self) {
        self.command(LinkCommand::Reconnect);
    }

    fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    fn connection_state(&self) -> watch::Receiver<bool> {
        self.core.subscribe()
    }

    async fn write_to_network(
        &self,
        identifier: Option<&[u8]>,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        if !self.core.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let body = self.core.address(identifier, payload)?;
        let config = &self.connector.config;

        let endpoint = self.connector.endpoint.read().await;
        let endpoint = endpoint.as_ref().ok_or(TransportError::NotConnected)?;

        for _ in 0..config.copies() {
            let datagram = if config.sequence_mode {
                let mut datagram = BytesMut::with_capacity(body.len() + 1);
                datagram.put_u8(self.sequence.next());
                datagram.put_slice(&body);
                datagram.freeze()
            } else {
                body.clone()
            };
            endpoint.socket.send_to(&datagram, endpoint.peer).await?;
            self.core.record_sent(datagram.len());
        }

        debug!(
            transport = %self.core.name(),
            copies = config.copies(),
            frame = %hex::encode(&body),
            "frame sent"
        );
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.core.stats()
    }
}

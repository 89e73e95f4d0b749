// TCP Transport Implementation
// Length-prefixed frames over a reconnecting client stream

use crate::codec::Endian;
use crate::transport::binding::TransportDevice;
use crate::transport::shared::TransportCore;
use crate::transport::framing::{FrameEvent, LengthPrefixCodec, Preamble};
use crate::transport::supervisor::{Connector, LinkCommand, LinkHandle, SupervisorHandle};
use crate::transport::traits::StatCounters;
use crate::transport::{Transport, TransportConfig, TransportError, TransportStats};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};

// ============================================================================
// TCP TRANSPORT CONFIG
// ============================================================================

/// Configuration for TCP transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpTransportConfig {
    /// Base transport configuration
    pub base: TransportConfig,
    /// Peer host name or address
    pub host: String,
    /// Peer port
    pub port: u16,
    /// Length preamble width in bytes
    pub preamble_width: usize,
    /// Length preamble byte order
    pub preamble_endian: Endian,
    /// Body lengths above this are logged as anomalous
    pub anomalous_length_threshold: usize,
    /// Enable TCP_NODELAY
    pub nodelay: bool,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            base: TransportConfig::default(),
            host: "127.0.0.1".to_string(),
            port: 0,
            preamble_width: 1,
            preamble_endian: Endian::Big,
            anomalous_length_threshold: 5,
            nodelay: true,
        }
    }
}

impl TcpTransportConfig {
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

    pub fn with_preamble(mut self, width: usize, endian: Endian) -> Self {
        self.preamble_width = width;
        self.preamble_endian = endian;
        self
    }

    pub fn with_anomalous_length_threshold(mut self, threshold: usize) -> Self {
        self.anomalous_length_threshold = threshold;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn preamble(&self) -> Preamble {
        Preamble::new(self.preamble_width, self.preamble_endian)
    }

    /// A started body must complete within this window
    pub fn idle_timeout(&self) -> Duration {
        self.base.keepalive_interval().saturating_mul(2)
    }

    pub fn peer_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
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
        self.preamble().max_body()?;
        Ok(())
    }
}

// ============================================================================
// CONNECTOR
// ============================================================================

#[derive(Debug)]
struct TcpConnector {
    config: TcpTransportConfig,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
}

#[async_trait]
impl Connector for TcpConnector {
    async fn open(&self, link: LinkHandle) -> Result<JoinHandle<()>, TransportError> {
        let address = self.config.peer_address();
        let stream = TcpStream::connect(&address)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", address, e)))?;
        stream.set_nodelay(self.config.nodelay).ok();

        let (reader, writer) = stream.into_split();
        *self.writer.lock().await = Some(writer);

        let session = TcpSession {
            link,
            codec: LengthPrefixCodec::new(self.config.preamble()),
            idle_timeout: self.config.idle_timeout(),
            anomalous_threshold: self.config.anomalous_length_threshold,
        };
        Ok(tokio::spawn(session.run(reader)))
    }

    async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }
}

/// Reader half of one connection
struct TcpSession {
    link: LinkHandle,
    codec: LengthPrefixCodec,
    idle_timeout: Duration,
    anomalous_threshold: usize,
}

impl TcpSession {
    async fn run(mut self, mut reader: OwnedReadHalf) {
        // Armed while a body is outstanding
        let mut deadline: Option<Instant> = None;

        loop {
            let read = reader.read_buf(self.codec.buffer_mut());
            let result = match deadline {
                Some(at) => match timeout_at(at, read).await {
                    Ok(result) => result,
                    Err(_) => {
                        self.link.closed("idle timeout waiting for frame body");
                        return;
                    }
                },
                None => read.await,
            };

            match result {
                Ok(0) => {
                    self.link.closed("connection closed by peer");
                    return;
                }
                Ok(n) => {
                    trace!(transport = %self.link.core().name(), bytes = n, "read");
                    deadline = self.drain(deadline);
                }
                Err(e) => {
                    self.link.closed(e.to_string());
                    return;
                }
            }
        }
    }

    /// Pull every complete frame out of the buffer; returns the new idle deadline
    fn drain(&mut self, mut deadline: Option<Instant>) -> Option<Instant> {
        while let Some(event) = self.codec.next_event() {
            match event {
                FrameEvent::BodyStarted { len } => {
                    if len > self.anomalous_threshold {
                        StatCounters::bump(&self.link.core().stats.anomalous_lengths);
                        debug!(
                            transport = %self.link.core().name(),
                            len,
                            "anomalous frame length"
                        );
                    }
                    deadline = Instant::now().checked_add(self.idle_timeout);
                }
                FrameEvent::Frame(frame) => {
                    deadline = None;
                    debug!(
                        transport = %self.link.core().name(),
                        frame = %hex::encode(&frame),
                        "frame received"
                    );
                    self.link.deliver(frame);
                }
            }
        }
        deadline
    }
}

// ============================================================================
// TCP TRANSPORT
// ============================================================================

/// TCP transport: one reconnecting client connection
#[derive(Debug)]
pub struct TcpTransport {
    core: Arc<TransportCore>,
    connector: Arc<TcpConnector>,
    supervisor: OnceLock<SupervisorHandle>,
}

impl TcpTransport {
    pub fn new(config: TcpTransportConfig) -> Result<Self, TransportError> {
        config.validate()?;
        Ok(Self {
            core: Arc::new(TransportCore::new(config.base.clone())),
            connector: Arc::new(TcpConnector {
                config,
                writer: tokio::sync::Mutex::new(None),
            }),
            supervisor: OnceLock::new(),
        })
    }

    pub fn config(&self) -> &TcpTransportConfig {
        &self.connector.config
    }

    /// Number of live device bindings
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
impl Transport for TcpTransport {
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
        let frame = self.connector.config.preamble().encode(&body)?;

        // Held across the write so frames never interleave
        let mut writer = self.connector.writer.lock().await;
        let stream = writer.as_mut().ok_or(TransportError::NotConnected)?;
        stream.write_all(&frame).await?;
        drop(writer);

        self.core.record_sent(frame.len());
        debug!(transport = %self.core.name(), frame = %hex::encode(&body), "frame sent");
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.core.stats()
    }
}

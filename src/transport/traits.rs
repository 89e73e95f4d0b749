// Transport Traits and Core Types
// Defines the abstract Transport contract shared by the TCP, UDP and loopback links

use crate::transport::binding::TransportDevice;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

// ============================================================================
// TRANSPORT CONFIG
// ============================================================================

/// Base configuration for all transport types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Name used in log lines
    pub name: String,
    /// Keepalive interval; the reconnect tick runs at half of it
    pub keepalive_interval_ms: u64,
    /// Device identifier length for identified (multi-device) links
    pub identifier_length: Option<usize>,
    /// Upper bound on a single connection attempt
    pub connect_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            name: "link".to_string(),
            keepalive_interval_ms: 5_000,
            identifier_length: None,
            connect_timeout_ms: 3_000,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_keepalive_interval_ms(mut self, ms: u64) -> Self {
        self.keepalive_interval_ms = ms;
        self
    }

    pub fn with_identifier_length(mut self, len: Option<usize>) -> Self {
        self.identifier_length = len;
        self
    }

    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    /// Period of the reconnection tick
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis((self.keepalive_interval_ms / 2).max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Whether the link multiplexes several identified devices
    pub fn is_identified(&self) -> bool {
        self.identifier_length.is_some()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.keepalive_interval_ms == 0 {
            return Err(TransportError::InvalidConfig(
                "keepalive_interval_ms cannot be 0".to_string(),
            ));
        }
        if self.identifier_length == Some(0) {
            return Err(TransportError::InvalidConfig(
                "identifier_length must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// CONNECTION STATE
// ============================================================================

/// Actual state of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl From<bool> for ConnectionState {
    fn from(connected: bool) -> Self {
        if connected {
            Self::Connected
        } else {
            Self::Disconnected
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

// ============================================================================
// TRANSPORT ERRORS
// ============================================================================

/// Errors that can occur in the transport layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("socket is not connected")]
    NotConnected,

    #[error("Transport already has a device bound")]
    DeviceAlreadyBound,

    #[error("Identified transport requires a device identifier")]
    MissingIdentifier,

    #[error("Single-device transport does not take a device identifier")]
    UnexpectedIdentifier,

    #[error("Identifier length {actual} does not match transport identifier length {expected}")]
    IdentifierLengthMismatch { expected: usize, actual: usize },

    #[error("Device identifier {0} is already bound to this transport")]
    DuplicateIdentifier(String),

    #[error("Payload of {len} bytes exceeds the {max} byte frame limit")]
    PayloadTooLarge { len: usize, max: u64 },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl TransportError {
    /// Errors raised while binding devices, fatal at setup time
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceAlreadyBound
                | Self::MissingIdentifier
                | Self::UnexpectedIdentifier
                | Self::IdentifierLengthMismatch { .. }
                | Self::DuplicateIdentifier(_)
                | Self::InvalidConfig(_)
        )
    }

    /// Errors the reconnection tick recovers from on its own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::ConnectionFailed(_) | Self::Timeout | Self::IoError(_)
        )
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

// ============================================================================
// TRANSPORT STATISTICS
// ============================================================================

/// Snapshot of transport counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportStats {
    /// Successful connection establishments
    pub connects: u64,
    /// Transitions back to disconnected
    pub disconnects: u64,
    /// Frames handed to the wire (UDP duplicates counted individually)
    pub frames_sent: u64,
    /// Frames delivered upward
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// TCP length preambles above the sanity threshold
    pub anomalous_lengths: u64,
    /// UDP datagrams dropped as empty or stale
    pub dropped_datagrams: u64,
}

/// Live counters behind [`TransportStats`]
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    pub connects: AtomicU64,
    pub disconnects: AtomicU64,
    pub frames_sent: AtomicU64,
    pub frames_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub anomalous_lengths: AtomicU64,
    pub dropped_datagrams: AtomicU64,
}

impl StatCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, amount: usize) {
        counter.fetch_add(amount as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TransportStats {
        TransportStats {
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            anomalous_lengths: self.anomalous_lengths.load(Ordering::Relaxed),
            dropped_datagrams: self.dropped_datagrams.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// TRANSPORT TRAIT
// ============================================================================

/// One physical link carrying frames for one or more devices.
///
/// `connect`/`disconnect` only record intent; the link's tick establishes
/// or tears down the socket asynchronously. Inbound frames are pushed to
/// every bound [`TransportDevice`].
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Name used in log lines
    fn name(&self) -> &str;

    /// Bind a device to this transport
    fn add_device(&self, binding: Arc<TransportDevice>) -> Result<(), TransportError>;

    /// Request the link to be up
    fn connect(&self);

    /// Request the link to be down
    fn disconnect(&self);

    /// Force an immediate teardown-and-reestablish cycle
    fn reconnect(&self);

    /// Whether the link is actually up right now
    fn is_connected(&self) -> bool;

    /// Observable connectivity, updated on every transition
    fn connection_state(&self) -> watch::Receiver<bool>;

    /// Encode and send one frame for the device with `identifier`
    async fn write_to_network(
        &self,
        identifier: Option<&[u8]>,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    /// Counter snapshot
    fn stats(&self) -> TransportStats;
}

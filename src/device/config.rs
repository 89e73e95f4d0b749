// Device Configuration

use crate::device::DeviceError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Name used in log lines
    pub name: String,
    /// Identifier on identified (multi-device) transports
    pub identifier: Option<Vec<u8>>,
    /// Silence longer than this takes the device offline
    pub keepalive_window_ms: u64,
    /// Interval between keepalive pings while the transport is up
    pub ping_interval_ms: u64,
    /// Version byte written into request and keepalive frames
    pub protocol_version: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "device".to_string(),
            identifier: None,
            keepalive_window_ms: 5_000,
            ping_interval_ms: 1_000,
            protocol_version: 1,
        }
    }
}

impl DeviceConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_identifier(mut self, identifier: &[u8]) -> Self {
        self.identifier = Some(identifier.to_vec());
        self
    }

    pub fn with_keepalive_window_ms(mut self, ms: u64) -> Self {
        self.keepalive_window_ms = ms;
        self
    }

    pub fn with_ping_interval_ms(mut self, ms: u64) -> Self {
        self.ping_interval_ms = ms;
        self
    }

    pub fn with_protocol_version(mut self, version: u8) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn keepalive_window(&self) -> Duration {
        Duration::from_millis(self.keepalive_window_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.keepalive_window_ms == 0 {
            return Err(DeviceError::InvalidConfig(
                "keepalive_window_ms cannot be 0".to_string(),
            ));
        }
        if self.ping_interval_ms == 0 {
            return Err(DeviceError::InvalidConfig(
                "ping_interval_ms cannot be 0".to_string(),
            ));
        }
        if matches!(&self.identifier, Some(id) if id.is_empty()) {
            return Err(DeviceError::InvalidConfig(
                "identifier cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// Service
// Typed request/response endpoint on a device

use crate::device::{Device, RequestError, RequestOptions};
use crate::property::hooks::{Decode, Encode, Raw};
use bytes::Bytes;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1_000);

/// A request/response endpoint identified by a byte prefix.
///
/// Inputs go through the hook's encoder and responses through its
/// decoder. A service attaches to at most one device, once.
pub struct Service<H = Raw> {
    identifier: Bytes,
    timeout: Duration,
    hooks: H,
    device: OnceLock<Device>,
}

impl<H> Service<H> {
    pub fn new(identifier: &[u8], hooks: H) -> Self {
        Self {
            identifier: Bytes::copy_from_slice(identifier),
            timeout: DEFAULT_TIMEOUT,
            hooks,
            device: OnceLock::new(),
        }
    }

    /// Per-request timeout; zero waits forever
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_timeout_ms(self, ms: u64) -> Self {
        self.with_timeout(Duration::from_millis(ms))
    }

    pub fn identifier(&self) -> &[u8] {
        &self.identifier
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn device(&self) -> Option<&Device> {
        self.device.get()
    }

    pub fn is_attached(&self) -> bool {
        self.device.get().is_some()
    }

    pub(crate) fn bind(&self, device: Device) -> bool {
        self.device.set(device).is_ok()
    }
}

impl<H: Encode + Decode> Service<H> {
    /// Issue a request and decode the response.
    ///
    /// `Ok(None)` means the peer answered with a payload the decoder
    /// rejected.
    pub async fn request(&self, input: &H::Input) -> Result<Option<H::Output>, RequestError> {
        self.send(input, true).await
    }

    /// Like [`Service::request`], without logging failures
    pub async fn request_quietly(
        &self,
        input: &H::Input,
    ) -> Result<Option<H::Output>, RequestError> {
        self.send(input, false).await
    }

    async fn send(&self, input: &H::Input, log_errors: bool) -> Result<Option<H::Output>, RequestError> {
        let device = self.device.get().ok_or(RequestError::NotAttached)?;
        let payload = self.hooks.encode(input)?;

        let mut options = RequestOptions::new(self.timeout);
        options.log_errors = log_errors;
        let response = device
            .request_with(&self.identifier, &payload, options)
            .await?;
        Ok(self.hooks.decode(&response))
    }
}

impl<H> fmt::Debug for Service<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("identifier", &hex::encode(&self.identifier))
            .field("timeout", &self.timeout)
            .field("device", &self.device.get().map(Device::name))
            .finish()
    }
}

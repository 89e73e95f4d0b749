// Device Errors
// Construction-time failures and the three request-level outcomes

use crate::codec::CodecError;
use crate::transport::TransportError;
use thiserror::Error;

/// Errors raised while building a device or attaching properties to it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Service identifier {0} is already attached to this device")]
    DuplicateService(String),

    #[error("Event identifier {0} is already attached to this device")]
    DuplicateEvent(String),

    #[error("Property is already attached to a device")]
    AlreadyAttached,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transport rejected device: {0}")]
    Transport(#[from] TransportError),
}

/// Failure of a single request, delivered through the request future
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("device is not online")]
    NotOnline,

    #[error("request timed out")]
    TimedOut,

    #[error("request aborted due to disconnection")]
    Aborted,

    #[error("no free request id")]
    NoFreeRequestId,

    #[error("no device attached")]
    NotAttached,

    #[error("device shut down")]
    Shutdown,

    #[error("cannot encode request: {0}")]
    Encode(#[from] CodecError),

    #[error(transparent)]
    Write(#[from] TransportError),
}

impl RequestError {
    /// Whether retrying later could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotOnline | Self::TimedOut | Self::Aborted | Self::NoFreeRequestId | Self::Write(_)
        )
    }
}

// Transport/Device Binding
// The record tying one device to one transport, and the rules for adding one

use crate::transport::TransportError;
use bytes::Bytes;
use std::fmt;
use std::sync::{Arc, Weak};

/// Receiving side of a binding, implemented by devices
pub trait FrameSink: Send + Sync {
    /// Handle one inbound frame, identifier already stripped
    fn ingest(&self, frame: Bytes);

    /// Handle a transport connectivity transition
    fn connection_changed(&self, connected: bool);
}

/// Binding between one transport and one device.
///
/// The transport holds the binding strongly but the device only weakly,
/// so dropping the device ends the binding.
pub struct TransportDevice {
    identifier: Option<Bytes>,
    sink: Weak<dyn FrameSink>,
}

impl TransportDevice {
    pub fn new(identifier: Option<Bytes>, sink: Weak<dyn FrameSink>) -> Self {
        Self { identifier, sink }
    }

    pub fn identifier(&self) -> Option<&[u8]> {
        self.identifier.as_deref()
    }

    /// Whether the bound device still exists
    pub fn is_alive(&self) -> bool {
        self.sink.strong_count() > 0
    }

    /// Offer a raw transport frame to the device.
    ///
    /// On identified links the frame must start with this binding's
    /// identifier; the remainder is ingested. Returns whether the frame
    /// was taken.
    pub fn ingest(&self, frame: &Bytes) -> bool {
        let Some(sink) = self.sink.upgrade() else {
            return false;
        };
        match &self.identifier {
            None => {
                sink.ingest(frame.clone());
                true
            }
            Some(id) if frame.starts_with(id) => {
                sink.ingest(frame.slice(id.len()..));
                true
            }
            Some(_) => false,
        }
    }

    pub fn notify_connection(&self, connected: bool) {
        if let Some(sink) = self.sink.upgrade() {
            sink.connection_changed(connected);
        }
    }
}

impl fmt::Debug for TransportDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportDevice")
            .field("identifier", &self.identifier.as_deref().map(hex::encode))
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Bindings attached to one transport, validated against the link's
/// identifier rules
#[derive(Debug, Default)]
pub struct BindingSet {
    identifier_length: Option<usize>,
    bindings: Vec<Arc<TransportDevice>>,
}

impl BindingSet {
    pub fn new(identifier_length: Option<usize>) -> Self {
        Self {
            identifier_length,
            bindings: Vec::new(),
        }
    }

    /// Add a binding, dropping any whose device is gone first
    pub fn add(&mut self, binding: Arc<TransportDevice>) -> Result<(), TransportError> {
        self.prune();

        match (self.identifier_length, binding.identifier()) {
            (None, Some(_)) => return Err(TransportError::UnexpectedIdentifier),
            (None, None) => {
                if !self.bindings.is_empty() {
                    return Err(TransportError::DeviceAlreadyBound);
                }
            }
            (Some(_), None) => return Err(TransportError::MissingIdentifier),
            (Some(expected), Some(id)) => {
                if id.len() != expected {
                    return Err(TransportError::IdentifierLengthMismatch {
                        expected,
                        actual: id.len(),
                    });
                }
                if self.bindings.iter().any(|b| b.identifier() == Some(id)) {
                    return Err(TransportError::DuplicateIdentifier(hex::encode(id)));
                }
            }
        }

        self.bindings.push(binding);
        Ok(())
    }

    /// Drop bindings whose device no longer exists
    pub fn prune(&mut self) -> usize {
        let before = self.bindings.len();
        self.bindings.retain(|b| b.is_alive());
        before - self.bindings.len()
    }

    /// Current bindings, for fan-out outside the lock
    pub fn snapshot(&self) -> Vec<Arc<TransportDevice>> {
        self.bindings.clone()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

// Shared Transport State
// State, bindings and fan-out shared by every concrete transport

use crate::transport::binding::{BindingSet, TransportDevice};
use crate::transport::traits::StatCounters;
use crate::transport::{ConnectionState, TransportConfig, TransportError, TransportStats};
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info};

/// Connection desire, actual state and device bindings of one link.
///
/// Every change of actual state goes through [`TransportCore::transition`],
/// which is the only place that publishes connectivity.
#[derive(Debug)]
pub struct TransportCore {
    config: TransportConfig,
    desired: AtomicBool,
    state: Mutex<ConnectionState>,
    connected_tx: watch::Sender<bool>,
    bindings: Mutex<BindingSet>,
    pub(crate) stats: StatCounters,
}

impl TransportCore {
    pub fn new(config: TransportConfig) -> Self {
        let (connected_tx, _) = watch::channel(false);
        let bindings = BindingSet::new(config.identifier_length);
        Self {
            config,
            desired: AtomicBool::new(false),
            state: Mutex::new(ConnectionState::Disconnected),
            connected_tx,
            bindings: Mutex::new(bindings),
            stats: StatCounters::default(),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn set_desired(&self, desired: bool) {
        self.desired.store(desired, Ordering::SeqCst);
    }

    pub fn desired(&self) -> bool {
        self.desired.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.connected_tx.subscribe()
    }

    /// Move to `next`; publishes and notifies devices only on change.
    /// Returns whether a transition happened.
    pub fn transition(&self, next: ConnectionState) -> bool {
        {
            let mut state = lock(&self.state);
            if *state == next {
                return false;
            }
            *state = next;
        }

        let connected = next.is_connected();
        if connected {
            StatCounters::bump(&self.stats.connects);
            info!(transport = %self.name(), "transport connected");
        } else {
            StatCounters::bump(&self.stats.disconnects);
            info!(transport = %self.name(), "transport disconnected");
        }

        self.connected_tx.send_replace(connected);
        for binding in self.bindings() {
            binding.notify_connection(connected);
        }
        true
    }

    pub fn add_device(&self, binding: Arc<TransportDevice>) -> Result<(), TransportError> {
        lock(&self.bindings).add(binding.clone())?;
        debug!(
            transport = %self.name(),
            identifier = ?binding.identifier().map(hex::encode),
            "device bound"
        );
        if self.is_connected() {
            binding.notify_connection(true);
        }
        Ok(())
    }

    pub fn device_count(&self) -> usize {
        let mut set = lock(&self.bindings);
        set.prune();
        set.len()
    }

    fn bindings(&self) -> Vec<Arc<TransportDevice>> {
        lock(&self.bindings).snapshot()
    }

    /// Fan one inbound frame out to every binding
    pub fn dispatch(&self, frame: Bytes) {
        StatCounters::bump(&self.stats.frames_received);
        StatCounters::add(&self.stats.bytes_received, frame.len());

        let mut taken = false;
        let mut stale = false;
        for binding in self.bindings() {
            if !binding.is_alive() {
                stale = true;
                continue;
            }
            taken |= binding.ingest(&frame);
        }

        if stale {
            lock(&self.bindings).prune();
        }
        if !taken {
            debug!(
                transport = %self.name(),
                frame = %hex::encode(&frame),
                "inbound frame matched no device"
            );
        }
    }

    /// Prefix `payload` with the device identifier on identified links
    pub fn address(&self, identifier: Option<&[u8]>, payload: &[u8]) -> Result<Bytes, TransportError> {
        match (self.config.identifier_length, identifier) {
            (None, None) => Ok(Bytes::copy_from_slice(payload)),
            (None, Some(_)) => Err(TransportError::UnexpectedIdentifier),
            (Some(_), None) => Err(TransportError::MissingIdentifier),
            (Some(expected), Some(id)) if id.len() != expected => {
                Err(TransportError::IdentifierLengthMismatch {
                    expected,
                    actual: id.len(),
                })
            }
            (Some(_), Some(id)) => {
                let mut frame = BytesMut::with_capacity(id.len() + payload.len());
                frame.put_slice(id);
                frame.put_slice(payload);
                Ok(frame.freeze())
            }
        }
    }

    /// Record one frame put on the wire
    pub fn record_sent(&self, len: usize) {
        StatCounters::bump(&self.stats.frames_sent);
        StatCounters::add(&self.stats.bytes_sent, len);
    }

    pub fn stats(&self) -> TransportStats {
        self.stats.snapshot()
    }
}

/// Lock a std mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

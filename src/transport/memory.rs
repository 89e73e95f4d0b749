// Memory Transport Implementation
// In-process loopback link with a scriptable peer, for tests and dry runs

use crate::transport::binding::TransportDevice;
use crate::transport::shared::TransportCore;
use crate::transport::{ConnectionState, Transport, TransportConfig, TransportError, TransportStats};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Loopback transport.
///
/// Connection changes apply immediately instead of on a tick: `connect`
/// brings the link up as long as the peer is reachable.
#[derive(Debug)]
pub struct MemoryTransport {
    core: Arc<TransportCore>,
    reachable: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<Bytes>,
}

/// The far end of a [`MemoryTransport`]
#[derive(Debug)]
pub struct MemoryPeer {
    core: Arc<TransportCore>,
    reachable: Arc<AtomicBool>,
    outbound: mpsc::UnboundedReceiver<Bytes>,
}

impl MemoryTransport {
    /// Create a linked transport/peer pair
    pub fn pair(config: TransportConfig) -> (Arc<Self>, MemoryPeer) {
        let core = Arc::new(TransportCore::new(config));
        let reachable = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::unbounded_channel();

        let transport = Arc::new(Self {
            core: core.clone(),
            reachable: reachable.clone(),
            outbound: tx,
        });
        let peer = MemoryPeer {
            core,
            reachable,
            outbound: rx,
        };
        (transport, peer)
    }

    pub fn device_count(&self) -> usize {
        self.core.device_count()
    }

    fn reconcile(&self) {
        let up = self.core.desired() && self.reachable.load(Ordering::SeqCst);
        self.core.transition(ConnectionState::from(up));
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn add_device(&self, binding: Arc<TransportDevice>) -> Result<(), TransportError> {
        self.core.add_device(binding)
    }

    fn connect(&self) {
        self.core.set_desired(true);
        self.reconcile();
    }

    fn disconnect(&self) {
        self.core.set_desired(false);
        self.reconcile();
    }

    fn reconnect(&self) {
        self.core.transition(ConnectionState::Disconnected);
        self.reconcile();
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
        let frame = self.core.address(identifier, payload)?;
        self.core.record_sent(frame.len());
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::IoError("memory peer dropped".to_string()))
    }

    fn stats(&self) -> TransportStats {
        self.core.stats()
    }
}

impl MemoryPeer {
    /// Deliver a frame to the transport's devices, as if received
    pub fn inject(&self, frame: impl Into<Bytes>) {
        self.core.dispatch(frame.into());
    }

    /// Next frame the transport wrote
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.outbound.recv().await
    }

    /// Next written frame, if one is already queued
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.outbound.try_recv().ok()
    }

    /// Drain every queued written frame
    pub fn drain(&mut self) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Make the link drop (false) or come back if still wanted (true)
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
        let up = reachable && self.core.desired();
        self.core.transition(ConnectionState::from(up));
    }
}

// Shared device fixtures over the in-memory transport

use homegate::Transport;
use homegate::device::packet::{self, RequestFrame};
use homegate::transport::{MemoryPeer, MemoryTransport, TransportConfig};
use homegate::{Device, DeviceConfig};
use std::sync::Arc;

pub struct Rig {
    pub device: Device,
    pub transport: Arc<MemoryTransport>,
    pub peer: MemoryPeer,
}

/// Device with the given keepalive window on a fresh loopback link
pub fn rig(window_ms: u64) -> Rig {
    let (transport, peer) = MemoryTransport::pair(TransportConfig::new().with_name("memory"));
    let config = DeviceConfig::new("relay").with_keepalive_window_ms(window_ms);
    let device = Device::new(config, transport.clone()).unwrap();
    Rig {
        device,
        transport,
        peer,
    }
}

impl Rig {
    /// Connect the link and acknowledge a keepalive
    pub fn bring_online(&self) {
        self.transport.connect();
        self.ack();
        assert!(self.device.is_online());
    }

    /// Deliver a keepalive acknowledgment from the peer
    pub fn ack(&self) {
        self.peer.inject(vec![packet::KEEPALIVE_ID]);
    }

    /// Next request frame the device wrote, skipping keepalives
    pub async fn next_request(&mut self) -> RequestFrame {
        loop {
            let frame = self.peer.recv().await.expect("transport dropped");
            if packet::is_keepalive(&frame) {
                continue;
            }
            return RequestFrame::parse(&frame).expect("not a request frame");
        }
    }
}

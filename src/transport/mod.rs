// Transport module - THE WIRE (abstract)
// Connection lifecycle and byte framing for TCP, UDP and in-memory links

mod binding;
mod framing;
mod memory;
mod sequence;
mod shared;
mod supervisor;
mod tcp;
mod traits;
mod udp;

pub use traits::{
    // Core trait
    Transport,
    // Configuration
    TransportConfig,
    // State
    ConnectionState,
    // Errors and statistics
    TransportError, TransportStats,
};

pub use binding::{BindingSet, FrameSink, TransportDevice};

pub use framing::{FrameEvent, LengthPrefixCodec, Preamble};
pub use tcp::{TcpTransport, TcpTransportConfig};

pub use sequence::{SequenceCounter, SequenceFilter};
pub use udp::{UdpTransport, UdpTransportConfig, MAX_UDP_PAYLOAD};

pub use memory::{MemoryPeer, MemoryTransport};

// Device module - THE PEER
// Request multiplexing, event demux and keepalive liveness over one transport

mod config;
mod error;
mod handle;
mod liveness;
pub mod packet;
mod pending;
mod stats;
mod supervisor;

pub use config::DeviceConfig;
pub use error::{DeviceError, RequestError};
pub use handle::{Device, EventSink, RequestOptions};
pub use liveness::{Liveness, Transition};
pub use stats::DeviceStats;

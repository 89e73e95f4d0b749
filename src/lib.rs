// homegate
// Device communication substrate for a home-automation gateway: framed TCP/UDP
// transports, multiplexed request/response/event devices and typed properties

pub mod codec;
pub mod device;
pub mod property;
pub mod transport;

pub use device::{Device, DeviceConfig, DeviceError, RequestError};
pub use property::{Event, Service};
pub use transport::{Transport, TransportConfig, TransportError};

// Property module - THE ENDPOINTS
// Typed services and events that driver code attaches to a device

mod event;
mod hooks;
mod service;

pub use event::Event;
pub use hooks::{Decode, Encode, Flag, Int, Raw, Uint, Utf8};
pub use service::{Service, DEFAULT_TIMEOUT};

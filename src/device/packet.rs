// Device Packet Format
// Request, response, event and keepalive frames carried inside a transport frame
//
//   request   [request-id][version][service-id..][pad if id <= 1 byte][payload..]
//   response  [request-id][payload..]
//   event     [0x00][event-id..][payload..]
//   keepalive [0xFF][version][0xFF][0x00]( [reset-flag] )

use bytes::{BufMut, Bytes, BytesMut};

/// Request-id value reserved for events
pub const EVENT_ID: u8 = 0x00;

/// Request-id value reserved for keepalive traffic
pub const KEEPALIVE_ID: u8 = 0xFF;

/// Command byte of a keepalive frame
pub const KEEPALIVE_COMMAND: u8 = 0xFF;

/// Byte appended to one-byte (or empty) service identifiers
pub const INDEX_PAD: u8 = 0x00;

/// Values never handed out as request ids
pub const RESERVED_IDS: [u8; 2] = [EVENT_ID, KEEPALIVE_ID];

/// Build a request frame
pub fn encode_request(request_id: u8, version: u8, service_id: &[u8], payload: &[u8]) -> Bytes {
    let pad = service_id.len() <= 1;
    let mut frame = BytesMut::with_capacity(2 + service_id.len() + usize::from(pad) + payload.len());
    frame.put_u8(request_id);
    frame.put_u8(version);
    frame.put_slice(service_id);
    if pad {
        frame.put_u8(INDEX_PAD);
    }
    frame.put_slice(payload);
    frame.freeze()
}

/// Build a keepalive ping, optionally carrying a reset flag
pub fn encode_keepalive(version: u8, reset: Option<bool>) -> Bytes {
    let mut frame = BytesMut::with_capacity(5);
    frame.put_u8(KEEPALIVE_ID);
    frame.put_u8(version);
    frame.put_u8(KEEPALIVE_COMMAND);
    frame.put_u8(0x00);
    if let Some(flag) = reset {
        frame.put_u8(u8::from(flag));
    }
    frame.freeze()
}

/// Build a response frame (peer side; used by simulators and tests)
pub fn encode_response(request_id: u8, payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(1 + payload.len());
    frame.put_u8(request_id);
    frame.put_slice(payload);
    frame.freeze()
}

/// Build an event frame (peer side; used by simulators and tests)
pub fn encode_event(event_id: &[u8], payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(1 + event_id.len() + payload.len());
    frame.put_u8(EVENT_ID);
    frame.put_slice(event_id);
    frame.put_slice(payload);
    frame.freeze()
}

/// Classified inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Event frame; `body` is the event identifier followed by its payload
    Event { body: Bytes },
    /// Keepalive acknowledgment (or any 0xFF-tagged frame)
    Keepalive { body: Bytes },
    /// Response to the request with `request_id`
    Response { request_id: u8, payload: Bytes },
}

impl Inbound {
    /// Classify a frame by its leading request-id byte; `None` for empty frames
    pub fn parse(frame: &Bytes) -> Option<Self> {
        let (&request_id, _) = frame.split_first()?;
        let body = frame.slice(1..);
        Some(match request_id {
            EVENT_ID => Self::Event { body },
            KEEPALIVE_ID => Self::Keepalive { body },
            request_id => Self::Response {
                request_id,
                payload: body,
            },
        })
    }
}

/// Peer-side view of a request frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub request_id: u8,
    pub version: u8,
    /// Service identifier plus pad, then payload
    pub body: Bytes,
}

impl RequestFrame {
    pub fn parse(frame: &Bytes) -> Option<Self> {
        if frame.len() < 2 || frame[0] == EVENT_ID || frame[0] == KEEPALIVE_ID {
            return None;
        }
        Some(Self {
            request_id: frame[0],
            version: frame[1],
            body: frame.slice(2..),
        })
    }

    /// Payload after a known service identifier, if the frame addresses it
    pub fn payload_for(&self, service_id: &[u8]) -> Option<Bytes> {
        let head = service_id.len() + usize::from(service_id.len() <= 1);
        if !self.body.starts_with(service_id) || self.body.len() < head {
            return None;
        }
        Some(self.body.slice(head..))
    }
}

/// Whether a frame is a keepalive ping (as sent by a device handle)
pub fn is_keepalive(frame: &[u8]) -> bool {
    frame.len() >= 4 && frame[0] == KEEPALIVE_ID && frame[2] == KEEPALIVE_COMMAND
}

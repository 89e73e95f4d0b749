// Length-Prefixed Framing
// Stream framing for TCP links: [length preamble][body]

use crate::codec::{max_uint, read_uint, write_uint, Endian};
use crate::transport::TransportError;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Shape of the length preamble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preamble {
    /// Preamble width in bytes (1..=8)
    pub width: usize,
    pub endian: Endian,
}

impl Default for Preamble {
    fn default() -> Self {
        Self {
            width: 1,
            endian: Endian::Big,
        }
    }
}

impl Preamble {
    pub fn new(width: usize, endian: Endian) -> Self {
        Self { width, endian }
    }

    /// Largest body this preamble can describe
    pub fn max_body(&self) -> Result<u64, TransportError> {
        max_uint(self.width).map_err(|e| TransportError::InvalidConfig(e.to_string()))
    }

    /// Prepend the length preamble to `payload`
    pub fn encode(&self, payload: &[u8]) -> Result<Bytes, TransportError> {
        let max = self.max_body()?;
        let len = payload.len() as u64;
        if len > max {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max,
            });
        }

        let header = write_uint(len, self.width, self.endian)
            .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;
        let mut frame = BytesMut::with_capacity(header.len() + payload.len());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(payload);
        Ok(frame.freeze())
    }
}

/// Reader state: waiting for a preamble, or for a body of known length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Preamble,
    Body(usize),
}

/// Something the decoder produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A preamble was accepted and a body of `len` bytes is now outstanding
    BodyStarted { len: usize },
    /// A complete frame body
    Frame(Bytes),
}

/// Incremental decoder for length-prefixed frames.
///
/// Bytes are appended to an owned buffer (directly via [`buffer_mut`]
/// for socket reads) and whole frames are split off without copying.
///
/// [`buffer_mut`]: LengthPrefixCodec::buffer_mut
#[derive(Debug)]
pub struct LengthPrefixCodec {
    preamble: Preamble,
    state: ReadState,
    buffer: BytesMut,
}

impl LengthPrefixCodec {
    pub fn new(preamble: Preamble) -> Self {
        Self {
            preamble,
            state: ReadState::Preamble,
            buffer: BytesMut::with_capacity(256),
        }
    }

    pub fn preamble(&self) -> Preamble {
        self.preamble
    }

    /// Append received bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Buffer to read socket data into
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Length of the body currently outstanding, if any
    pub fn pending_body(&self) -> Option<usize> {
        match self.state {
            ReadState::Body(len) => Some(len),
            ReadState::Preamble => None,
        }
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.state = ReadState::Preamble;
        self.buffer.clear();
    }

    /// Advance the reader as far as the buffered bytes allow
    pub fn next_event(&mut self) -> Option<FrameEvent> {
        match self.state {
            ReadState::Preamble => {
                let width = self.preamble.width;
                let len = read_uint(&self.buffer, 0, width, self.preamble.endian)?;
                let _ = self.buffer.split_to(width);
                let len = usize::try_from(len).unwrap_or(usize::MAX);
                self.state = ReadState::Body(len);
                Some(FrameEvent::BodyStarted { len })
            }
            ReadState::Body(len) => {
                if self.buffer.len() < len {
                    return None;
                }
                let body = self.buffer.split_to(len).freeze();
                self.state = ReadState::Preamble;
                Some(FrameEvent::Frame(body))
            }
        }
    }
}

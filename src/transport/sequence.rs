// UDP Sequence Numbers
// One-byte outbound counter and best-effort inbound stale-packet filter

use std::sync::atomic::{AtomicU8, Ordering};

/// Outbound sequence counter, wrapping 0xFF -> 0x00
#[derive(Debug, Default)]
pub struct SequenceCounter {
    next: AtomicU8,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(value: u8) -> Self {
        Self {
            next: AtomicU8::new(value),
        }
    }

    /// Take the current value and advance
    pub fn next(&self) -> u8 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Inbound filter accepting a sequence number only if it is at or above
/// the last accepted one, or the sender just wrapped from 0xFF to 0.
///
/// This suppresses stale packets; it does not restore order.
#[derive(Debug, Clone, Default)]
pub struct SequenceFilter {
    last: Option<u8>,
}

impl SequenceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last accepted sequence number
    pub fn watermark(&self) -> Option<u8> {
        self.last
    }

    /// Check `sequence` and advance the watermark when it is accepted
    pub fn accept(&mut self, sequence: u8) -> bool {
        let accepted = match self.last {
            None => true,
            Some(last) => sequence >= last || (last == 0xFF && sequence == 0),
        };
        if accepted {
            self.last = Some(sequence);
        }
        accepted
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

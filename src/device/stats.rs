// Device Statistics

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of device counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub requests_sent: u64,
    pub responses: u64,
    pub timeouts: u64,
    /// Requests rejected because the device went offline
    pub aborts: u64,
    /// Event payloads handed to attached events
    pub events: u64,
    /// Responses whose request id had nothing pending
    pub unmatched_responses: u64,
    pub keepalives_sent: u64,
}

#[derive(Debug, Default)]
pub(crate) struct DeviceCounters {
    pub requests_sent: AtomicU64,
    pub responses: AtomicU64,
    pub timeouts: AtomicU64,
    pub aborts: AtomicU64,
    pub events: AtomicU64,
    pub unmatched_responses: AtomicU64,
    pub keepalives_sent: AtomicU64,
}

impl DeviceCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, amount: usize) {
        counter.fetch_add(amount as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DeviceStats {
        DeviceStats {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            responses: self.responses.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            unmatched_responses: self.unmatched_responses.load(Ordering::Relaxed),
            keepalives_sent: self.keepalives_sent.load(Ordering::Relaxed),
        }
    }
}

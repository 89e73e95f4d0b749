// Pending Requests
// In-flight requests keyed by request id, each with exactly one terminal outcome

use crate::device::RequestError;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub(crate) type Resolver = oneshot::Sender<Result<Bytes, RequestError>>;

/// One in-flight request
#[derive(Debug)]
pub struct PendingRequest {
    serial: u64,
    resolver: Resolver,
    timer: Option<JoinHandle<()>>,
    log_errors: bool,
}

impl PendingRequest {
    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn settle(self, outcome: Result<Bytes, RequestError>) {
        // The caller may have stopped waiting
        let _ = self.resolver.send(outcome);
    }
}

/// Table of in-flight requests.
///
/// Every entry carries a serial so that a timer or a dropped caller
/// belonging to an earlier holder of the same request id can never touch
/// a later request.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<u8, PendingRequest>,
    next_serial: u64,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, request_id: u8) -> bool {
        self.entries.contains_key(&request_id)
    }

    /// Track a new request; returns its serial
    pub(crate) fn insert(&mut self, request_id: u8, resolver: Resolver, log_errors: bool) -> u64 {
        self.next_serial += 1;
        let serial = self.next_serial;
        let previous = self.entries.insert(
            request_id,
            PendingRequest {
                serial,
                resolver,
                timer: None,
                log_errors,
            },
        );
        debug_assert!(previous.is_none(), "request id {request_id} reused while pending");
        serial
    }

    /// Hand the expiry timer to its request; aborts it if the request already ended
    pub fn attach_timer(&mut self, request_id: u8, serial: u64, timer: JoinHandle<()>) -> bool {
        match self.entries.get_mut(&request_id) {
            Some(entry) if entry.serial == serial => {
                entry.timer = Some(timer);
                true
            }
            _ => {
                timer.abort();
                false
            }
        }
    }

    /// Complete a request with its response payload
    pub fn resolve(&mut self, request_id: u8, payload: Bytes) -> bool {
        match self.entries.remove(&request_id) {
            Some(mut entry) => {
                entry.stop_timer();
                entry.settle(Ok(payload));
                true
            }
            None => false,
        }
    }

    /// Reject a request whose timer fired. Called from the timer itself,
    /// so the timer handle is dropped rather than aborted.
    pub fn expire(&mut self, request_id: u8, serial: u64) -> Option<bool> {
        let entry = self.take(request_id, serial)?;
        let log_errors = entry.log_errors;
        entry.settle(Err(RequestError::TimedOut));
        Some(log_errors)
    }

    /// Forget a request whose caller went away
    pub fn cancel(&mut self, request_id: u8, serial: u64) -> bool {
        match self.take(request_id, serial) {
            Some(mut entry) => {
                entry.stop_timer();
                true
            }
            None => false,
        }
    }

    /// Reject every request with `error`; returns how many were rejected
    pub fn reject_all(&mut self, error: RequestError) -> usize {
        let count = self.entries.len();
        for (_, mut entry) in self.entries.drain() {
            entry.stop_timer();
            entry.settle(Err(error.clone()));
        }
        count
    }

    fn take(&mut self, request_id: u8, serial: u64) -> Option<PendingRequest> {
        match self.entries.get(&request_id) {
            Some(entry) if entry.serial == serial => self.entries.remove(&request_id),
            _ => None,
        }
    }
}

// Event
// Fire-and-forget inbound endpoint publishing its latest decoded value

use crate::device::EventSink;
use crate::property::hooks::{Decode, Raw};
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

struct EventShared<H: Decode> {
    identifier: Bytes,
    hooks: H,
    latest: watch::Sender<Option<H::Output>>,
    attached: AtomicBool,
}

/// An inbound notification endpoint identified by a byte prefix.
///
/// Each matching event payload is decoded; values that decode are
/// published to subscribers, others are dropped. Clones share state.
pub struct Event<H: Decode = Raw> {
    shared: Arc<EventShared<H>>,
}

impl<H: Decode> Clone for Event<H> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<H: Decode + 'static> Event<H> {
    pub fn new(identifier: &[u8], hooks: H) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            shared: Arc::new(EventShared {
                identifier: Bytes::copy_from_slice(identifier),
                hooks,
                latest,
                attached: AtomicBool::new(false),
            }),
        }
    }

    pub fn identifier(&self) -> &[u8] {
        &self.shared.identifier
    }

    /// Observe decoded values; `None` until the first one arrives
    pub fn subscribe(&self) -> watch::Receiver<Option<H::Output>> {
        self.shared.latest.subscribe()
    }

    /// Most recently decoded value
    pub fn latest(&self) -> Option<H::Output> {
        self.shared.latest.borrow().clone()
    }

    pub fn is_attached(&self) -> bool {
        self.shared.attached.load(Ordering::SeqCst)
    }

    /// Claim the event for a device; false if already claimed
    pub(crate) fn mark_attached(&self) -> bool {
        !self.shared.attached.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn sink(&self) -> Arc<dyn EventSink> {
        self.shared.clone()
    }
}

impl<H: Decode> EventSink for EventShared<H> {
    fn identifier(&self) -> &[u8] {
        &self.identifier
    }

    fn publish(&self, payload: Bytes) {
        match self.hooks.decode(&payload) {
            Some(value) => {
                self.latest.send_replace(Some(value));
            }
            None => trace!(
                event = %hex::encode(&self.identifier),
                payload = %hex::encode(&payload),
                "dropping undecodable event payload"
            ),
        }
    }
}

impl<H: Decode> fmt::Debug for Event<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("identifier", &hex::encode(&self.shared.identifier))
            .field("attached", &self.shared.attached.load(Ordering::SeqCst))
            .finish()
    }
}

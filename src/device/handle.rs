// Device Handle
// Request multiplexing, event demultiplexing and liveness for one peer

use crate::codec::RollingIdAllocator;
use crate::device::liveness::{Liveness, Transition};
use crate::device::packet::{self, Inbound};
use crate::device::pending::PendingTable;
use crate::device::stats::{DeviceCounters, DeviceStats};
use crate::device::supervisor;
use crate::device::{DeviceConfig, DeviceError, RequestError};
use crate::property::{Decode, Encode, Event, Service, DEFAULT_TIMEOUT};
use crate::transport::{FrameSink, Transport, TransportDevice};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, watch, Notify};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

// ============================================================================
// EVENT SINK
// ============================================================================

/// Receiver of event payloads, keyed by an identifier prefix
pub trait EventSink: Send + Sync {
    fn identifier(&self) -> &[u8];

    /// Handle the bytes following the identifier
    fn publish(&self, payload: Bytes);
}

// ============================================================================
// REQUEST OPTIONS
// ============================================================================

/// Per-call request settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Zero, or a span too long to schedule, waits forever
    pub timeout: Duration,
    /// Log refusals, timeouts and aborts
    pub log_errors: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            log_errors: true,
        }
    }
}

impl RequestOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn quiet(mut self) -> Self {
        self.log_errors = false;
        self
    }
}

// ============================================================================
// DEVICE
// ============================================================================

struct DeviceState {
    liveness: Liveness,
    pending: PendingTable,
    ids: RollingIdAllocator,
    services: HashSet<Bytes>,
    events: Vec<Arc<dyn EventSink>>,
    last_seen: Option<DateTime<Utc>>,
    /// Set when the transport comes up; the supervisor answers with a ping
    connect_pending: bool,
}

pub(crate) struct DeviceInner {
    config: DeviceConfig,
    identifier: Option<Bytes>,
    transport: Arc<dyn Transport>,
    state: Mutex<DeviceState>,
    wake: Arc<Notify>,
    shutdown: Arc<Notify>,
    stats: DeviceCounters,
}

/// One addressable peer on a transport.
///
/// Cloning yields another handle to the same device. The keepalive
/// supervisor stops once the last handle is dropped.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    /// Create a device and bind it to `transport`.
    ///
    /// Must be called inside a tokio runtime; the keepalive supervisor is
    /// spawned here.
    pub fn new(config: DeviceConfig, transport: Arc<dyn Transport>) -> Result<Self, DeviceError> {
        config.validate()?;

        let state = DeviceState {
            liveness: Liveness::new(config.keepalive_window()),
            pending: PendingTable::new(),
            ids: RollingIdAllocator::with_random_start(1, 254, &packet::RESERVED_IDS),
            services: HashSet::new(),
            events: Vec::new(),
            last_seen: None,
            connect_pending: false,
        };
        let inner = Arc::new(DeviceInner {
            identifier: config.identifier.clone().map(Bytes::from),
            config,
            transport,
            state: Mutex::new(state),
            wake: Arc::new(Notify::new()),
            shutdown: Arc::new(Notify::new()),
            stats: DeviceCounters::default(),
        });

        let weak: Weak<DeviceInner> = Arc::downgrade(&inner);
        let sink: Weak<dyn FrameSink> = weak.clone();
        let binding = TransportDevice::new(inner.identifier.clone(), sink);
        inner.transport.add_device(Arc::new(binding))?;

        tokio::spawn(supervisor::run(
            weak,
            inner.wake.clone(),
            inner.shutdown.clone(),
            inner.config.ping_interval(),
        ));

        debug!(
            device = %inner.config.name,
            transport = %inner.transport.name(),
            "device bound"
        );
        Ok(Self { inner })
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    pub fn identifier(&self) -> Option<&[u8]> {
        self.inner.identifier.as_deref()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// Transport connected AND application level online
    pub fn is_online(&self) -> bool {
        self.inner.lock().liveness.is_online()
    }

    /// Observable online state
    pub fn online(&self) -> watch::Receiver<bool> {
        self.inner.lock().liveness.subscribe()
    }

    pub fn app_online(&self) -> bool {
        self.inner.lock().liveness.app_online()
    }

    pub fn transport_connected(&self) -> bool {
        self.inner.lock().liveness.transport_connected()
    }

    /// Wall-clock time of the last inbound frame
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_seen
    }

    /// Requests currently awaiting a terminal outcome
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn stats(&self) -> DeviceStats {
        self.inner.stats.snapshot()
    }

    /// Send a request and wait for its response payload.
    ///
    /// A zero `timeout` waits until a response arrives or the device goes
    /// offline.
    pub async fn request(
        &self,
        service_id: &[u8],
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Bytes, RequestError> {
        self.request_with(service_id, payload, RequestOptions::new(timeout))
            .await
    }

    pub async fn request_with(
        &self,
        service_id: &[u8],
        payload: &[u8],
        options: RequestOptions,
    ) -> Result<Bytes, RequestError> {
        let inner = &self.inner;
        let (tx, rx) = oneshot::channel();

        let (request_id, serial) = {
            let mut state = inner.lock();
            if !state.liveness.is_online() {
                if options.log_errors {
                    warn!(device = %inner.config.name, "request refused: device is not online");
                }
                return Err(RequestError::NotOnline);
            }

            let DeviceState { ids, pending, .. } = &mut *state;
            let Some(request_id) = ids.next_free(|id| pending.contains(id)) else {
                if options.log_errors {
                    warn!(device = %inner.config.name, "request refused: no free request id");
                }
                return Err(RequestError::NoFreeRequestId);
            };
            let serial = pending.insert(request_id, tx, options.log_errors);
            (request_id, serial)
        };
        let _ticket = RequestTicket {
            inner,
            request_id,
            serial,
        };

        let frame = packet::encode_request(
            request_id,
            inner.config.protocol_version,
            service_id,
            payload,
        );
        if let Err(e) = inner
            .transport
            .write_to_network(inner.identifier.as_deref(), &frame)
            .await
        {
            if options.log_errors {
                warn!(device = %inner.config.name, request_id, "request write failed: {}", e);
            }
            return Err(RequestError::Write(e));
        }
        DeviceCounters::bump(&inner.stats.requests_sent);
        debug!(
            device = %inner.config.name,
            request_id,
            frame = %hex::encode(&frame),
            "request sent"
        );

        let deadline = Some(options.timeout)
            .filter(|t| !t.is_zero())
            .and_then(|t| Instant::now().checked_add(t));
        if let Some(deadline) = deadline {
            let weak = Arc::downgrade(inner);
            let timer = tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                if let Some(inner) = weak.upgrade() {
                    inner.expire(request_id, serial);
                }
            });
            inner.lock().pending.attach_timer(request_id, serial, timer);
        }

        rx.await.unwrap_or(Err(RequestError::Shutdown))
    }

    /// Send a keepalive carrying the reset flag
    pub async fn send_reset(&self, flag: bool) -> Result<(), RequestError> {
        self.inner.send_keepalive(Some(flag)).await
    }

    /// Attach a service; its identifier must be unique on this device
    pub fn add_service<H>(&self, service: &Service<H>) -> Result<(), DeviceError>
    where
        H: Encode + Decode,
    {
        if service.is_attached() {
            return Err(DeviceError::AlreadyAttached);
        }

        let identifier = Bytes::copy_from_slice(service.identifier());
        {
            let mut state = self.inner.lock();
            if state.services.contains(&identifier) {
                return Err(DeviceError::DuplicateService(hex::encode(&identifier)));
            }
            state.services.insert(identifier.clone());
        }

        if !service.bind(self.clone()) {
            self.inner.lock().services.remove(&identifier);
            return Err(DeviceError::AlreadyAttached);
        }
        debug!(device = %self.name(), service = %hex::encode(&identifier), "service attached");
        Ok(())
    }

    /// Attach an event; its identifier must be unique on this device
    pub fn add_event<H>(&self, event: &Event<H>) -> Result<(), DeviceError>
    where
        H: Decode + 'static,
    {
        let sink = event.sink();
        let mut state = self.inner.lock();
        if state.events.iter().any(|e| e.identifier() == sink.identifier()) {
            return Err(DeviceError::DuplicateEvent(hex::encode(sink.identifier())));
        }
        if !event.mark_attached() {
            return Err(DeviceError::AlreadyAttached);
        }
        debug!(device = %self.name(), event = %hex::encode(sink.identifier()), "event attached");
        state.events.push(sink);
        Ok(())
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.inner.config.name)
            .field("identifier", &self.inner.identifier.as_deref().map(hex::encode))
            .field("online", &self.is_online())
            .finish()
    }
}

// ============================================================================
// INTERNALS
// ============================================================================

impl DeviceInner {
    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn name(&self) -> &str {
        &self.config.name
    }

    pub(crate) fn transport_connected(&self) -> bool {
        self.lock().liveness.transport_connected()
    }

    pub(crate) fn idle_deadline(&self) -> Option<Instant> {
        self.lock().liveness.idle_deadline()
    }

    pub(crate) fn take_connect_pending(&self) -> bool {
        std::mem::take(&mut self.lock().connect_pending)
    }

    pub(crate) async fn send_keepalive(&self, reset: Option<bool>) -> Result<(), RequestError> {
        let frame = packet::encode_keepalive(self.config.protocol_version, reset);
        self.transport
            .write_to_network(self.identifier.as_deref(), &frame)
            .await?;
        DeviceCounters::bump(&self.stats.keepalives_sent);
        trace!(device = %self.config.name, "keepalive sent");
        Ok(())
    }

    /// Take the application level offline if the keepalive window closed
    pub(crate) fn check_idle(&self) {
        let mut state = self.lock();
        let transition = state.liveness.check_idle(Instant::now());
        if transition == Transition::WentOffline {
            warn!(
                device = %self.config.name,
                window_ms = self.config.keepalive_window_ms,
                "no traffic within keepalive window"
            );
        }
        self.settle(&mut state, transition);
    }

    fn expire(&self, request_id: u8, serial: u64) {
        let expired = self.lock().pending.expire(request_id, serial);
        if let Some(log_errors) = expired {
            DeviceCounters::bump(&self.stats.timeouts);
            if log_errors {
                warn!(device = %self.config.name, request_id, "request timed out");
            }
        }
    }

    /// Apply the side effects of an online state change
    fn settle(&self, state: &mut DeviceState, transition: Transition) {
        match transition {
            Transition::CameOnline => info!(device = %self.config.name, "device online"),
            Transition::WentOffline => {
                info!(device = %self.config.name, "device offline");
                let aborted = state.pending.reject_all(RequestError::Aborted);
                if aborted > 0 {
                    DeviceCounters::add(&self.stats.aborts, aborted);
                    warn!(
                        device = %self.config.name,
                        aborted,
                        "pending requests aborted due to disconnection"
                    );
                }
            }
            Transition::Unchanged => {}
        }
    }
}

impl FrameSink for DeviceInner {
    fn ingest(&self, frame: Bytes) {
        let mut deliveries = Vec::new();
        {
            let mut state = self.lock();
            state.last_seen = Some(Utc::now());
            let transition = state.liveness.record_inbound(Instant::now());
            self.settle(&mut state, transition);

            match Inbound::parse(&frame) {
                Some(Inbound::Response {
                    request_id,
                    payload,
                }) => {
                    if state.pending.resolve(request_id, payload) {
                        DeviceCounters::bump(&self.stats.responses);
                    } else {
                        DeviceCounters::bump(&self.stats.unmatched_responses);
                        debug!(device = %self.config.name, request_id, "dropping unmatched response");
                    }
                }
                Some(Inbound::Event { body }) => {
                    for sink in &state.events {
                        let id = sink.identifier();
                        if body.starts_with(id) {
                            deliveries.push((sink.clone(), body.slice(id.len()..)));
                        }
                    }
                    if deliveries.is_empty() {
                        debug!(device = %self.config.name, body = %hex::encode(&body), "event with no listener");
                    }
                }
                Some(Inbound::Keepalive { .. }) => {
                    trace!(device = %self.config.name, "keepalive acknowledged");
                }
                None => {}
            }
        }

        for (sink, payload) in deliveries {
            DeviceCounters::bump(&self.stats.events);
            sink.publish(payload);
        }
        self.wake.notify_one();
    }

    fn connection_changed(&self, connected: bool) {
        {
            let mut state = self.lock();
            let transition = state.liveness.set_transport(connected, Instant::now());
            if connected {
                state.connect_pending = true;
            }
            self.settle(&mut state, transition);
        }
        debug!(device = %self.config.name, connected, "transport connectivity changed");
        self.wake.notify_one();
    }
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

/// Removes a request's pending entry if its caller stops waiting
struct RequestTicket<'a> {
    inner: &'a DeviceInner,
    request_id: u8,
    serial: u64,
}

impl Drop for RequestTicket<'_> {
    fn drop(&mut self) {
        self.inner.lock().pending.cancel(self.request_id, self.serial);
    }
}

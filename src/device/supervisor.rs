// Keepalive Supervisor
// Per-device task: pings while the transport is up and closes the idle window

use crate::device::handle::DeviceInner;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, trace};

enum Wakeup {
    Nudged,
    PingDue,
    IdleDeadline,
}

/// Runs until the device is dropped.
///
/// Holds the device only weakly between wakeups so the last handle going
/// away ends the task.
pub(crate) async fn run(
    device: Weak<DeviceInner>,
    wake: Arc<Notify>,
    shutdown: Arc<Notify>,
    ping_interval: Duration,
) {
    let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let Some(inner) = device.upgrade() else {
            break;
        };
        let connected = inner.transport_connected();
        let deadline = inner.idle_deadline();
        drop(inner);

        let wakeup = tokio::select! {
            _ = shutdown.notified() => break,
            _ = wake.notified() => Wakeup::Nudged,
            _ = ping.tick(), if connected => Wakeup::PingDue,
            _ = idle(deadline) => Wakeup::IdleDeadline,
        };

        let Some(inner) = device.upgrade() else {
            break;
        };
        match wakeup {
            Wakeup::Nudged => {
                if inner.take_connect_pending() {
                    ping_once(&inner).await;
                    ping.reset();
                }
            }
            Wakeup::PingDue => ping_once(&inner).await,
            Wakeup::IdleDeadline => inner.check_idle(),
        }
    }

    trace!("keepalive supervisor stopped");
}

async fn idle(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn ping_once(inner: &DeviceInner) {
    if let Err(e) = inner.send_keepalive(None).await {
        debug!(device = %inner.name(), "keepalive not sent: {}", e);
    }
}

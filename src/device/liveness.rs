// Liveness
// Device online state: transport connectivity AND application-level keepalive

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Change of the combined online state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    CameOnline,
    WentOffline,
}

/// Tracks the two signals a device's online state is derived from.
///
/// `app_online` starts false, turns true on any inbound frame and falls
/// back to false once a full window passes without one. The idle window
/// only runs while the transport is connected and restarts on reconnect.
#[derive(Debug)]
pub struct Liveness {
    window: Duration,
    transport_connected: bool,
    app_online: bool,
    last_activity: Option<Instant>,
    online_tx: watch::Sender<bool>,
}

impl Liveness {
    pub fn new(window: Duration) -> Self {
        let (online_tx, _) = watch::channel(false);
        Self {
            window,
            transport_connected: false,
            app_online: false,
            last_activity: None,
            online_tx,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_online(&self) -> bool {
        self.transport_connected && self.app_online
    }

    pub fn transport_connected(&self) -> bool {
        self.transport_connected
    }

    pub fn app_online(&self) -> bool {
        self.app_online
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online_tx.subscribe()
    }

    /// When the idle window closes, if it is running
    pub fn idle_deadline(&self) -> Option<Instant> {
        if !self.transport_connected || !self.app_online {
            return None;
        }
        self.last_activity.map(|at| at + self.window)
    }

    /// Record transport connectivity.
    ///
    /// A drop leaves the application-level flag untouched, so after a
    /// reconnect the device reads online before any keepalive ack arrives;
    /// the idle window restarts at `now` and closes it if the peer stays
    /// silent.
    pub fn set_transport(&mut self, connected: bool, now: Instant) -> Transition {
        self.update(|l| {
            l.transport_connected = connected;
            if connected {
                l.last_activity = Some(now);
            }
        })
    }

    pub fn record_inbound(&mut self, now: Instant) -> Transition {
        self.update(|l| {
            l.app_online = true;
            l.last_activity = Some(now);
        })
    }

    /// Take the application level offline if the window has closed
    pub fn check_idle(&mut self, now: Instant) -> Transition {
        match self.idle_deadline() {
            Some(deadline) if now >= deadline => self.update(|l| l.app_online = false),
            _ => Transition::Unchanged,
        }
    }

    fn update(&mut self, apply: impl FnOnce(&mut Self)) -> Transition {
        let before = self.is_online();
        apply(self);
        let after = self.is_online();

        match (before, after) {
            (false, true) => {
                self.online_tx.send_replace(true);
                Transition::CameOnline
            }
            (true, false) => {
                self.online_tx.send_replace(false);
                Transition::WentOffline
            }
            _ => Transition::Unchanged,
        }
    }
}

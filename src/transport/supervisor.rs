// Link Supervisor
// Tick-driven reconciliation of desired vs. actual connection state

use crate::transport::shared::TransportCore;
use crate::transport::{ConnectionState, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, warn};

/// Messages into the supervisor loop
#[derive(Debug)]
pub(crate) enum LinkCommand {
    /// Reconcile now instead of waiting for the next tick
    Reconcile,
    /// Tear down and re-establish if still desired
    Reconnect,
    /// A session's reader stopped
    Closed { generation: u64, reason: String },
    Shutdown,
}

/// What a session reader uses to push frames up and report closure
#[derive(Debug, Clone)]
pub struct LinkHandle {
    core: Arc<TransportCore>,
    commands: mpsc::UnboundedSender<LinkCommand>,
    generation: u64,
}

impl LinkHandle {
    pub fn core(&self) -> &TransportCore {
        &self.core
    }

    pub fn deliver(&self, frame: Bytes) {
        self.core.dispatch(frame);
    }

    /// Report that the session ended (error, end of stream, idle timeout)
    pub fn closed(&self, reason: impl Into<String>) {
        let _ = self.commands.send(LinkCommand::Closed {
            generation: self.generation,
            reason: reason.into(),
        });
    }
}

/// Socket-specific half of a transport
#[async_trait]
pub(crate) trait Connector: Send + Sync + 'static {
    /// Establish a fresh session and spawn its reader
    async fn open(&self, link: LinkHandle) -> Result<JoinHandle<()>, TransportError>;

    /// Release the session's outbound half
    async fn close(&self);
}

/// Owner side of a running supervisor; dropping it stops the loop
#[derive(Debug)]
pub(crate) struct SupervisorHandle {
    commands: mpsc::UnboundedSender<LinkCommand>,
}

impl SupervisorHandle {
    pub fn spawn<C: Connector>(core: Arc<TransportCore>, connector: Arc<C>) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor {
            core,
            connector,
            commands: commands.clone(),
            session: None,
            generation: 0,
        };
        tokio::spawn(supervisor.run(rx));
        Self { commands }
    }

    pub fn send(&self, command: LinkCommand) {
        let _ = self.commands.send(command);
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(LinkCommand::Shutdown);
    }
}

struct Supervisor<C> {
    core: Arc<TransportCore>,
    connector: Arc<C>,
    commands: mpsc::UnboundedSender<LinkCommand>,
    session: Option<JoinHandle<()>>,
    generation: u64,
}

impl<C: Connector> Supervisor<C> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<LinkCommand>) {
        let mut ticker = interval(self.core.config().tick_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let command = tokio::select! {
                _ = ticker.tick() => LinkCommand::Reconcile,
                command = rx.recv() => command.unwrap_or(LinkCommand::Shutdown),
            };

            match command {
                LinkCommand::Reconcile => self.reconcile().await,
                LinkCommand::Reconnect => {
                    debug!(transport = %self.core.name(), "forced reconnect");
                    self.teardown().await;
                    self.reconcile().await;
                }
                LinkCommand::Closed { generation, reason } => {
                    if generation == self.generation && self.session.is_some() {
                        warn!(transport = %self.core.name(), %reason, "link lost");
                        self.teardown().await;
                    }
                }
                LinkCommand::Shutdown => {
                    self.teardown().await;
                    break;
                }
            }
        }
        debug!(transport = %self.core.name(), "supervisor stopped");
    }

    /// The single authority deciding connect vs. disconnect
    async fn reconcile(&mut self) {
        let desired = self.core.desired();
        let connected = self.core.is_connected();

        if desired && !connected {
            self.teardown().await;
            self.establish().await;
        } else if !desired && connected {
            self.teardown().await;
        }
    }

    async fn establish(&mut self) {
        self.generation += 1;
        let link = LinkHandle {
            core: self.core.clone(),
            commands: self.commands.clone(),
            generation: self.generation,
        };

        let limit = self.core.config().connect_timeout();
        let result = match timeout(limit, self.connector.open(link)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };

        match result {
            Ok(reader) => {
                self.session = Some(reader);
                self.core.transition(ConnectionState::Connected);
            }
            Err(e) => {
                warn!(transport = %self.core.name(), error = %e, "connect attempt failed");
                self.connector.close().await;
            }
        }
    }

    async fn teardown(&mut self) {
        if let Some(reader) = self.session.take() {
            reader.abort();
        }
        self.connector.close().await;
        self.core.transition(ConnectionState::Disconnected);
    }
}

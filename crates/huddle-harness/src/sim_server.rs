//! Simulation server wrapper.
//!
//! `SimServer` wraps `ServerDriver<SimEnv>` and plays the part of the
//! transport: it records every delivery in a per-connection inbox and, like
//! the WebSocket runtime, answers each `CloseConnection` by reporting the
//! connection closed back to the driver.
//!
//! Tests drive it explicitly; nothing runs in the background.

use std::{collections::BTreeMap, time::Duration};

use huddle_core::env::Environment;
use huddle_proto::{ClientMessage, ConnectionId, ServerMessage};
use huddle_server::{DriverConfig, DriverError, LogLevel, ServerAction, ServerDriver, ServerEvent};

use crate::{SimEnv, sim_env::SimInstant};

/// Simulation server.
#[derive(Debug)]
pub struct SimServer {
    /// The action-based server driver
    driver: ServerDriver<SimEnv>,
    /// Shared simulation environment
    env: SimEnv,
    /// Messages delivered per connection, in delivery order
    inboxes: BTreeMap<ConnectionId, Vec<ServerMessage>>,
    /// Connections the server closed, with the reason given
    closed: Vec<(ConnectionId, String)>,
}

impl SimServer {
    /// Create a server with default configuration and the given RNG seed.
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, DriverConfig::default())
    }

    /// Create a server with custom configuration.
    pub fn with_config(seed: u64, config: DriverConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        let driver = ServerDriver::new(env.clone(), config);

        Self { driver, env, inboxes: BTreeMap::new(), closed: Vec::new() }
    }

    /// Accept a connection under `connection_id`.
    pub fn connect(&mut self, connection_id: &ConnectionId) -> Result<(), DriverError> {
        self.process(ServerEvent::ConnectionAccepted { connection_id: connection_id.clone() })
    }

    /// Deliver a client message.
    pub fn send(
        &mut self,
        connection_id: &ConnectionId,
        message: ClientMessage,
    ) -> Result<(), DriverError> {
        self.process(ServerEvent::MessageReceived { connection_id: connection_id.clone(), message })
    }

    /// Report that a client went away.
    pub fn disconnect(&mut self, connection_id: &ConnectionId) -> Result<(), DriverError> {
        self.process(ServerEvent::ConnectionClosed {
            connection_id: connection_id.clone(),
            reason: "client disconnect".to_string(),
        })
    }

    /// Report that the transport heard a ping or pong from a client.
    pub fn heartbeat(&mut self, connection_id: &ConnectionId) -> Result<(), DriverError> {
        self.process(ServerEvent::Heartbeat { connection_id: connection_id.clone() })
    }

    /// Run one idle-timeout sweep.
    pub fn tick(&mut self) -> Result<(), DriverError> {
        self.process(ServerEvent::Tick)
    }

    /// Advance virtual time.
    pub fn advance(&mut self, by: Duration) {
        self.env.advance(by);
    }

    /// Current virtual time.
    pub fn now(&self) -> SimInstant {
        self.env.now()
    }

    /// Process one event and everything it causes.
    ///
    /// Server-initiated closes are fed back as `ConnectionClosed` after the
    /// whole batch has been executed, in the order they were issued.
    pub fn process(&mut self, event: ServerEvent) -> Result<(), DriverError> {
        let actions = self.driver.process_event(event)?;
        let closes = self.execute_actions(actions);

        for (connection_id, reason) in closes {
            let actions =
                self.driver.process_event(ServerEvent::ConnectionClosed { connection_id, reason })?;
            self.execute_actions(actions);
        }

        Ok(())
    }

    /// Execute server actions, returning the connections to close.
    fn execute_actions(
        &mut self,
        actions: Vec<ServerAction<SimInstant>>,
    ) -> Vec<(ConnectionId, String)> {
        let mut closes = Vec::new();

        for action in actions {
            match action {
                ServerAction::SendToConnection { connection_id, message } => {
                    self.inboxes.entry(connection_id).or_default().push(message);
                },
                ServerAction::CloseConnection { connection_id, reason } => {
                    self.closed.push((connection_id.clone(), reason.clone()));
                    closes.push((connection_id, reason));
                },
                ServerAction::Log { level, message, .. } => log(level, &message),
            }
        }

        closes
    }

    /// Messages delivered to `connection_id` so far.
    pub fn inbox(&self, connection_id: &ConnectionId) -> &[ServerMessage] {
        self.inboxes.get(connection_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Remove and return the messages delivered to `connection_id`.
    pub fn take_inbox(&mut self, connection_id: &ConnectionId) -> Vec<ServerMessage> {
        self.inboxes.remove(connection_id).unwrap_or_default()
    }

    /// Connections closed by the server, in order.
    pub fn closed(&self) -> &[(ConnectionId, String)] {
        &self.closed
    }

    /// The wrapped driver.
    pub fn driver(&self) -> &ServerDriver<SimEnv> {
        &self.driver
    }
}

fn log(level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!("{}", message),
        LogLevel::Info => tracing::info!("{}", message),
        LogLevel::Warn => tracing::warn!("{}", message),
        LogLevel::Error => tracing::error!("{}", message),
    }
}

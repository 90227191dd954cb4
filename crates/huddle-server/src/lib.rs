//! Huddle production server.
//!
//! Production relay using axum WebSockets for transport, Tokio for the async
//! runtime, and system time with the OS RNG.
//!
//! # Architecture
//!
//! The [`ServerDriver`] follows the Sans-IO pattern: it owns the
//! [`ConnectionRegistry`] and [`RoomDirectory`], consumes [`ServerEvent`]s and
//! returns [`ServerAction`]s. [`Server`] is the glue that feeds it events from
//! real sockets and executes the actions.
//!
//! # Components
//!
//! - [`ServerDriver`]: Event Router (pure logic, no I/O)
//! - [`ConnectionRegistry`]: per-connection lifecycle and display name
//! - [`RoomDirectory`]: rooms, members, observers
//! - [`Server`]: production runtime that executes driver actions
//! - [`SystemEnv`]: production environment (real time, OS RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod directory;
mod driver;
mod error;
mod registry;
mod server_error;
mod system_env;
mod transport;

use std::{
    collections::{HashMap, hash_map::Entry},
    future::Future,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

pub use directory::{ConnectionRemoval, Member, RoomDirectory, RoomExit};
pub use driver::{LogLevel, ServerAction, ServerConfig as DriverConfig, ServerDriver, ServerEvent};
pub use error::ServerError;
use huddle_proto::ConnectionId;
pub use registry::{ConnectionRegistry, UNKNOWN_USERNAME};
pub use server_error::{DriverError, ExecutorError};
pub use system_env::SystemEnv;
use tokio::{
    net::TcpListener,
    sync::{Mutex, mpsc},
    time::MissedTickBehavior,
};
pub use transport::GREETING;
use transport::Outbound;

/// Default interval between idle-timeout sweeps.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Default interval between WebSocket pings to each client.
///
/// Must stay well under the idle timeout so that a live client answers
/// several pings before a silent one is dropped.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Relay state shared by every connection task.
struct SharedState {
    /// Driver plus outbound queues, behind one lock
    relay: Mutex<Relay>,
    /// Environment (connection identifiers)
    env: SystemEnv,
    /// How often each writer pings its client
    heartbeat_interval: Duration,
}

/// Driver and the per-connection outbound queues it routes to.
///
/// Both live under the same lock so that one event's mutation and all of its
/// deliveries happen without another event interleaving.
struct Relay {
    /// The action-based server driver
    driver: ServerDriver<SystemEnv>,
    /// Map of connection ID to its writer queue
    outbound: HashMap<ConnectionId, mpsc::UnboundedSender<Outbound>>,
}

impl Relay {
    /// Register the writer queue for a new connection.
    ///
    /// Returns `false`, leaving the existing queue in place, if the
    /// identifier already has one.
    fn attach(
        &mut self,
        connection_id: ConnectionId,
        sender: mpsc::UnboundedSender<Outbound>,
    ) -> bool {
        match self.outbound.entry(connection_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(sender);
                true
            },
        }
    }

    /// Drop the writer queue for a finished connection.
    fn detach(&mut self, connection_id: &ConnectionId) {
        self.outbound.remove(connection_id);
    }

    /// Process one event and execute everything it produced.
    fn dispatch(&mut self, event: ServerEvent) -> Result<(), DriverError> {
        let actions = self.driver.process_event(event)?;
        self.execute_actions(actions);
        Ok(())
    }

    /// Execute server actions.
    ///
    /// Sends only enqueue; nothing here waits on the network.
    fn execute_actions(&self, actions: Vec<ServerAction<Instant>>) {
        for action in actions {
            match action {
                ServerAction::SendToConnection { connection_id, message } => {
                    let text = match message.encode() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!("Failed to encode {}: {}", message.event_name(), e);
                            continue;
                        },
                    };

                    if let Err(e) = self.deliver(&connection_id, Outbound::Text(text)) {
                        tracing::debug!("SendToConnection: {}", e);
                    }
                },

                ServerAction::CloseConnection { connection_id, reason } => {
                    tracing::info!("Closing connection {}: {}", connection_id, reason);
                    if let Err(e) = self.deliver(&connection_id, Outbound::Close(reason)) {
                        tracing::debug!("CloseConnection: {}", e);
                    }
                },

                ServerAction::Log { level, message, .. } => match level {
                    LogLevel::Debug => tracing::debug!("{}", message),
                    LogLevel::Info => tracing::info!("{}", message),
                    LogLevel::Warn => tracing::warn!("{}", message),
                    LogLevel::Error => tracing::error!("{}", message),
                },
            }
        }
    }

    /// Put one item on a connection's writer queue.
    fn deliver(&self, connection_id: &ConnectionId, item: Outbound) -> Result<(), ExecutorError> {
        let sender = self.outbound.get(connection_id).ok_or_else(|| ExecutorError::SendFailed {
            connection_id: connection_id.clone(),
            reason: "no writer registered".to_string(),
        })?;

        sender.send(item).map_err(|_| ExecutorError::SendFailed {
            connection_id: connection_id.clone(),
            reason: "writer closed".to_string(),
        })
    }
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:3000")
    pub bind_address: String,
    /// Interval between idle-timeout sweeps
    pub tick_interval: Duration,
    /// Interval between WebSocket pings to each client
    pub heartbeat_interval: Duration,
    /// Driver configuration (timeouts, limits)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            driver: DriverConfig::default(),
        }
    }
}

/// Production Huddle server.
///
/// Wraps `ServerDriver` with the WebSocket transport and system environment.
pub struct Server {
    /// Bound listener
    listener: TcpListener,
    /// Runtime configuration
    config: ServerRuntimeConfig,
}

impl Server {
    /// Create and bind a new server.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        if config.tick_interval.is_zero() {
            return Err(ServerError::Config("tick interval must be non-zero".to_string()));
        }
        if config.heartbeat_interval.is_zero() {
            return Err(ServerError::Config("heartbeat interval must be non-zero".to_string()));
        }

        let listener = TcpListener::bind(&config.bind_address).await.map_err(|e| {
            ServerError::Config(format!("cannot bind {}: {e}", config.bind_address))
        })?;

        Ok(Self { listener, config })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server until the process is killed.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server until `shutdown` resolves, then stop accepting and
    /// drain open connections.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("Server starting on {}", self.local_addr()?);

        let env = SystemEnv::new();
        let shared = Arc::new(SharedState {
            relay: Mutex::new(Relay {
                driver: ServerDriver::new(env.clone(), self.config.driver),
                outbound: HashMap::new(),
            }),
            env,
            heartbeat_interval: self.config.heartbeat_interval,
        });

        let ticker = tokio::spawn(tick_loop(Arc::clone(&shared), self.config.tick_interval));

        let result = axum::serve(self.listener, transport::router(shared))
            .with_graceful_shutdown(shutdown)
            .await;

        ticker.abort();
        result.map_err(|e| ServerError::Transport(e.to_string()))
    }
}

/// Feed `Tick` to the driver at a fixed interval.
async fn tick_loop(shared: Arc<SharedState>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let mut relay = shared.relay.lock().await;
        if let Err(e) = relay.dispatch(ServerEvent::Tick) {
            tracing::error!("Tick processing error: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use huddle_proto::{ClientMessage, JoinRequest};

    use super::*;

    fn relay() -> Relay {
        Relay {
            driver: ServerDriver::new(SystemEnv::new(), DriverConfig::default()),
            outbound: HashMap::new(),
        }
    }

    fn join(room: &str, name: &str) -> ClientMessage {
        ClientMessage::Join(JoinRequest { room_name: room.to_string(), username: name.to_string() })
    }

    #[test]
    fn dispatch_routes_to_attached_queues() {
        let mut relay = relay();
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        let a = ConnectionId::from("a");
        let b = ConnectionId::from("b");

        relay.attach(a.clone(), a_tx);
        relay.attach(b.clone(), b_tx);
        relay.dispatch(ServerEvent::ConnectionAccepted { connection_id: a.clone() }).unwrap();
        relay.dispatch(ServerEvent::ConnectionAccepted { connection_id: b.clone() }).unwrap();
        for (connection_id, name) in [(a, "alice"), (b, "bob")] {
            let message = join("lobby", name);
            relay.dispatch(ServerEvent::MessageReceived { connection_id, message }).unwrap();
        }

        let Ok(Outbound::Text(text)) = a_rx.try_recv() else {
            panic!("alice should hear bob join");
        };
        assert!(text.contains(r#""event":"userJoined""#));
        assert!(text.contains(r#""username":"bob""#));
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn attach_keeps_existing_writer() {
        let mut relay = relay();
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();
        let a = ConnectionId::from("a");

        assert!(relay.attach(a.clone(), first_tx));
        assert!(!relay.attach(a.clone(), second_tx));

        relay.deliver(&a, Outbound::Close("bye".to_string())).unwrap();
        assert_eq!(first_rx.try_recv(), Ok(Outbound::Close("bye".to_string())));
        assert!(second_rx.try_recv().is_err());
    }

    #[test]
    fn dispatch_surfaces_driver_errors() {
        let mut relay = relay();

        let result = relay.dispatch(ServerEvent::MessageReceived {
            connection_id: ConnectionId::from("ghost"),
            message: join("lobby", "casper"),
        });

        assert_eq!(result, Err(DriverError::ConnectionNotFound(ConnectionId::from("ghost"))));
    }

    #[test]
    fn deliver_without_writer_fails() {
        let relay = relay();

        let result = relay.deliver(&ConnectionId::from("a"), Outbound::Close("bye".to_string()));

        assert!(matches!(result, Err(ExecutorError::SendFailed { .. })));
    }

    #[tokio::test]
    async fn bind_rejects_zero_tick_interval() {
        let config = ServerRuntimeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            tick_interval: Duration::ZERO,
            ..Default::default()
        };

        assert!(matches!(Server::bind(config).await, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn bind_rejects_zero_heartbeat_interval() {
        let config = ServerRuntimeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            heartbeat_interval: Duration::ZERO,
            ..Default::default()
        };

        assert!(matches!(Server::bind(config).await, Err(ServerError::Config(_))));
    }
}

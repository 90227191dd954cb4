//! Server driver.
//!
//! The Event Router. Ties together per-connection state machines
//! ([`ConnectionRegistry`]) and room membership ([`RoomDirectory`]) and turns
//! every inbound event into the full list of deliveries it causes.
//!
//! The driver performs no I/O. The runtime feeds it [`ServerEvent`]s and
//! executes the returned [`ServerAction`]s in order. One call to
//! [`ServerDriver::process_event`] is one atomic step: the mutation and the
//! fan-out it produces are computed together, so a caller that serializes
//! calls (one lock, one actor) never routes to a half-removed member.

use std::time::{Duration, Instant};

use huddle_core::{
    ConnectionState, random_color,
    connection::{Connection, ConnectionConfig},
    env::Environment,
};
use huddle_proto::{
    ClientMessage, ConnectionId, JoinRequest, MousePosition, PositionUpdate, ServerMessage,
    UserJoined, UserLeft,
};

use crate::{directory::RoomDirectory, registry::ConnectionRegistry, server_error::DriverError};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Connection configuration (idle timeout)
    pub connection: ConnectionConfig,
    /// Maximum concurrent connections
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { connection: ConnectionConfig::default(), max_connections: 10_000 }
    }
}

/// Events that the server driver processes.
///
/// These are produced by the external runtime (simulation or production).
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Unique connection ID assigned by the runtime
        connection_id: ConnectionId,
    },

    /// A decoded message was received from a connection
    MessageReceived {
        /// Connection that sent the message
        connection_id: ConnectionId,
        /// The received message
        message: ClientMessage,
    },

    /// A connection was closed (by peer, error or the server)
    ConnectionClosed {
        /// Connection that was closed
        connection_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },

    /// The transport heard from a connection below the message layer
    /// (a pong answering a server ping, or a client ping)
    Heartbeat {
        /// Connection that is still alive
        connection_id: ConnectionId,
    },

    /// Periodic tick for timeout checking
    Tick,
}

/// Actions that the server driver produces.
///
/// These are executed by runtime-specific code (production or simulation).
#[derive(Debug, Clone, PartialEq)]
pub enum ServerAction<I = Instant> {
    /// Send a message to a specific connection
    SendToConnection {
        /// Target connection ID
        connection_id: ConnectionId,
        /// Message to send
        message: ServerMessage,
    },

    /// Close a connection
    CloseConnection {
        /// Connection to close
        connection_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
        /// When the event occurred
        timestamp: I,
    },
}

/// Log levels for server actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Action-based server driver.
///
/// Owns all relay state. Create one per server (or per test) and feed it
/// events one at a time.
pub struct ServerDriver<E>
where
    E: Environment,
{
    /// Connection state machines and display names
    registry: ConnectionRegistry<E::Instant>,
    /// Rooms, members and observers
    directory: RoomDirectory,
    /// Environment (time, RNG)
    env: E,
    /// Server configuration
    config: ServerConfig,
}

impl<E> ServerDriver<E>
where
    E: Environment,
{
    /// Create a new server driver.
    pub fn new(env: E, config: ServerConfig) -> Self {
        Self { registry: ConnectionRegistry::new(), directory: RoomDirectory::new(), env, config }
    }

    /// Process a server event and return actions to execute.
    ///
    /// This is the main entry point for the server driver. On error no state
    /// has been modified.
    pub fn process_event(
        &mut self,
        event: ServerEvent,
    ) -> Result<Vec<ServerAction<E::Instant>>, DriverError> {
        match event {
            ServerEvent::ConnectionAccepted { connection_id } => {
                self.handle_connection_accepted(connection_id)
            },
            ServerEvent::MessageReceived { connection_id, message } => {
                self.handle_message_received(connection_id, message)
            },
            ServerEvent::ConnectionClosed { connection_id, reason } => {
                Ok(self.handle_connection_closed(&connection_id, &reason))
            },
            ServerEvent::Heartbeat { connection_id } => {
                self.handle_heartbeat(&connection_id);
                Ok(Vec::new())
            },
            ServerEvent::Tick => Ok(self.handle_tick()),
        }
    }

    /// Handle a new connection being accepted.
    fn handle_connection_accepted(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<Vec<ServerAction<E::Instant>>, DriverError> {
        let now = self.env.now();

        if self.registry.contains(&connection_id) {
            return Err(DriverError::ConnectionAlreadyExists(connection_id));
        }

        if self.registry.len() >= self.config.max_connections {
            return Ok(vec![ServerAction::CloseConnection {
                connection_id,
                reason: "max connections exceeded".to_string(),
            }]);
        }

        let message = format!("a user connected: {connection_id}");
        self.registry.register(connection_id, Connection::new(now));

        Ok(vec![ServerAction::Log { level: LogLevel::Info, message, timestamp: now }])
    }

    /// Handle a decoded message from a connection.
    fn handle_message_received(
        &mut self,
        connection_id: ConnectionId,
        message: ClientMessage,
    ) -> Result<Vec<ServerAction<E::Instant>>, DriverError> {
        let now = self.env.now();

        let conn = self
            .registry
            .get_mut(&connection_id)
            .ok_or_else(|| DriverError::ConnectionNotFound(connection_id.clone()))?;

        if conn.state() == ConnectionState::Closed {
            return Ok(vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!(
                    "dropping {} from closing connection {connection_id}",
                    message.event_name()
                ),
                timestamp: now,
            }]);
        }

        conn.update_activity(now);

        let actions = match message {
            ClientMessage::CreateRoom(room) => self.handle_create_room(&connection_id, &room, now),
            ClientMessage::Join(request) => self.handle_join(&connection_id, request, now),
            ClientMessage::MousePosition(position) => {
                self.handle_mouse_position(&connection_id, position)
            },
        };

        Ok(actions)
    }

    /// `createRoom`: make sure the room exists and let the creator hear it.
    fn handle_create_room(
        &mut self,
        connection_id: &ConnectionId,
        room: &str,
        now: E::Instant,
    ) -> Vec<ServerAction<E::Instant>> {
        let created = self.directory.add_observer(room, connection_id);

        let message = if created {
            format!("room {room} created by {connection_id}")
        } else {
            format!("room {room} already exists, {connection_id} now observing")
        };

        vec![ServerAction::Log { level: LogLevel::Info, message, timestamp: now }]
    }

    /// `join`: record the name, add the member, announce to the room.
    fn handle_join(
        &mut self,
        connection_id: &ConnectionId,
        request: JoinRequest,
        now: E::Instant,
    ) -> Vec<ServerAction<E::Instant>> {
        let JoinRequest { room_name, username } = request;

        if let Err(err) = self.registry.record_join(connection_id, username.clone(), now) {
            return vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("join from {connection_id} rejected: {err}"),
                timestamp: now,
            }];
        }

        let color = random_color(&self.env);
        let created =
            self.directory.add_member(&room_name, connection_id, username.clone(), color.clone());

        let mut actions = Vec::new();
        if created {
            actions.push(ServerAction::Log {
                level: LogLevel::Info,
                message: format!("room {room_name} created by {connection_id}"),
                timestamp: now,
            });
        }

        let log = format!("user {username} joined room {room_name}");
        let announcement = ServerMessage::UserJoined(UserJoined {
            username,
            user_id: connection_id.clone(),
            color,
        });
        actions.extend(self.broadcast_except(&room_name, connection_id, &announcement));
        actions.push(ServerAction::Log { level: LogLevel::Info, message: log, timestamp: now });

        actions
    }

    /// `mousePosition`: one broadcast per room the sender is a member of,
    /// each carrying the sender's color in that room.
    fn handle_mouse_position(
        &self,
        connection_id: &ConnectionId,
        position: PositionUpdate,
    ) -> Vec<ServerAction<E::Instant>> {
        let username = self.registry.lookup_name(connection_id);
        let mut actions = Vec::new();

        for room in self.directory.rooms_containing(connection_id) {
            let Some(color) = self.directory.member_color(&room, connection_id) else {
                continue;
            };

            let update = ServerMessage::MousePosition(MousePosition {
                username: username.to_string(),
                x: position.x,
                y: position.y,
                color: color.clone(),
            });
            actions.extend(self.broadcast_except(&room, connection_id, &update));
        }

        actions
    }

    /// Handle a connection being closed: the disconnect cascade.
    fn handle_connection_closed(
        &mut self,
        connection_id: &ConnectionId,
        reason: &str,
    ) -> Vec<ServerAction<E::Instant>> {
        let now = self.env.now();

        if !self.registry.contains(connection_id) {
            return vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("close for unknown connection {connection_id} ignored"),
                timestamp: now,
            }];
        }

        let username = self.registry.lookup_name(connection_id).to_string();
        let removal = self.directory.remove_connection(connection_id);
        let mut actions = Vec::new();

        for exit in &removal.memberships {
            if exit.deleted {
                actions.push(ServerAction::Log {
                    level: LogLevel::Info,
                    message: format!("room {} deleted", exit.room),
                    timestamp: now,
                });
                continue;
            }

            let departure = ServerMessage::UserLeft(UserLeft { user_id: connection_id.clone() });
            actions.extend(self.broadcast_except(&exit.room, connection_id, &departure));
            actions.push(ServerAction::Log {
                level: LogLevel::Info,
                message: format!("user {username} left room {}", exit.room),
                timestamp: now,
            });
        }

        for exit in removal.observed.iter().filter(|exit| exit.deleted) {
            actions.push(ServerAction::Log {
                level: LogLevel::Info,
                message: format!("room {} deleted", exit.room),
                timestamp: now,
            });
        }

        if let Some(mut conn) = self.registry.remove(connection_id) {
            conn.close();
        }

        actions.push(ServerAction::Log {
            level: LogLevel::Info,
            message: format!(
                "user disconnected: {connection_id} ({reason}), was in {} rooms",
                removal.memberships.len()
            ),
            timestamp: now,
        });

        actions
    }

    /// Liveness from the transport counts as activity.
    ///
    /// Heartbeats from unknown or closing connections are ignored: the socket
    /// may still be draining after the driver let go of it.
    fn handle_heartbeat(&mut self, connection_id: &ConnectionId) {
        let now = self.env.now();
        if let Some(conn) = self.registry.get_mut(connection_id) {
            if conn.state() != ConnectionState::Closed {
                conn.update_activity(now);
            }
        }
    }

    /// Handle a periodic tick: close connections that went silent.
    ///
    /// Silence means neither messages nor heartbeats for longer than the idle
    /// timeout, i.e. the socket is dead. Live clients answer the transport's
    /// pings and never reach it. Timed-out connections move to Closed
    /// immediately; their memberships stay until the transport reports the
    /// socket closed.
    fn handle_tick(&mut self) -> Vec<ServerAction<E::Instant>> {
        let now = self.env.now();
        let idle_timeout = self.config.connection.idle_timeout;

        let mut expired: Vec<(ConnectionId, Duration)> = self
            .registry
            .iter()
            .filter_map(|(id, conn)| {
                conn.check_timeout(now, idle_timeout).map(|idle| (id.clone(), idle))
            })
            .collect();
        expired.sort_by(|a, b| a.0.cmp(&b.0));

        let mut actions = Vec::with_capacity(expired.len());
        for (connection_id, idle) in expired {
            if let Some(conn) = self.registry.get_mut(&connection_id) {
                conn.close();
            }
            actions.push(ServerAction::CloseConnection {
                connection_id,
                reason: format!("idle for {}s", idle.as_secs()),
            });
        }

        actions
    }

    /// One send per audience member of `room` except `exclude`.
    ///
    /// Connections already closing are skipped.
    fn broadcast_except(
        &self,
        room: &str,
        exclude: &ConnectionId,
        message: &ServerMessage,
    ) -> Vec<ServerAction<E::Instant>> {
        self.directory
            .audience(room)
            .filter(|target| *target != exclude)
            .filter(|target| {
                self.registry
                    .get(target)
                    .is_some_and(|conn| conn.state() != ConnectionState::Closed)
            })
            .map(|target| ServerAction::SendToConnection {
                connection_id: target.clone(),
                message: message.clone(),
            })
            .collect()
    }

    /// Connection registry (read-only).
    pub fn registry(&self) -> &ConnectionRegistry<E::Instant> {
        &self.registry
    }

    /// Room directory (read-only).
    pub fn directory(&self) -> &RoomDirectory {
        &self.directory
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of existing rooms.
    pub fn room_count(&self) -> usize {
        self.directory.room_count()
    }

    /// Check if a room exists.
    pub fn has_room(&self, room: &str) -> bool {
        self.directory.has_room(room)
    }

    /// Driver configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Environment the driver reads time and randomness from.
    pub fn env(&self) -> &E {
        &self.env
    }
}

impl<E> std::fmt::Debug for ServerDriver<E>
where
    E: Environment,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("connections", &self.registry.len())
            .field("rooms", &self.directory.room_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

//! Connection registry.
//!
//! One entry per live connection, keyed by the transport-assigned
//! [`ConnectionId`]. The registry is the single source of truth for a
//! connection's display name; room-level copies live in the
//! [`RoomDirectory`](crate::RoomDirectory).
//!
//! Name lookups never fail. A position event can race ahead of the first
//! join in a misbehaving client, so unknown connections resolve to
//! [`UNKNOWN_USERNAME`].

use std::{
    collections::HashMap,
    ops::Sub,
    time::{Duration, Instant},
};

use huddle_core::{Connection, ConnectionError};
use huddle_proto::ConnectionId;

/// Display name reported for connections that never joined.
pub const UNKNOWN_USERNAME: &str = "unknown";

/// Registry of live connections.
#[derive(Debug)]
pub struct ConnectionRegistry<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Connection ID → lifecycle state
    connections: HashMap<ConnectionId, Connection<I>>,
}

impl<I> Default for ConnectionRegistry<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I> ConnectionRegistry<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self { connections: HashMap::new() }
    }

    /// Register a new connection.
    ///
    /// Returns `false` if the identifier is already live.
    pub fn register(&mut self, connection_id: ConnectionId, connection: Connection<I>) -> bool {
        if self.connections.contains_key(&connection_id) {
            return false;
        }

        self.connections.insert(connection_id, connection);
        true
    }

    /// Store the display name for a connection. Last write wins.
    ///
    /// Unknown identifiers get a fresh entry, so this never loses a name.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if the connection is already closed
    pub fn record_join(
        &mut self,
        connection_id: &ConnectionId,
        name: impl Into<String>,
        now: I,
    ) -> Result<(), ConnectionError> {
        self.connections
            .entry(connection_id.clone())
            .or_insert_with(|| Connection::new(now))
            .record_join(name, now)
    }

    /// Display name of a connection, or [`UNKNOWN_USERNAME`].
    pub fn lookup_name(&self, connection_id: &ConnectionId) -> &str {
        self.connections
            .get(connection_id)
            .and_then(|conn| conn.display_name())
            .unwrap_or(UNKNOWN_USERNAME)
    }

    /// Remove a connection. No-op if absent.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<Connection<I>> {
        self.connections.remove(connection_id)
    }

    /// Connection state. `None` if not registered.
    pub fn get(&self, connection_id: &ConnectionId) -> Option<&Connection<I>> {
        self.connections.get(connection_id)
    }

    /// Mutable connection state. `None` if not registered.
    pub fn get_mut(&mut self, connection_id: &ConnectionId) -> Option<&mut Connection<I>> {
        self.connections.get_mut(connection_id)
    }

    /// Check if a connection is registered.
    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// All registered connections, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&ConnectionId, &Connection<I>)> {
        self.connections.iter()
    }

    /// Total number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

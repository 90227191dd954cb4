//! Real-system wrapper that mirrors [`ModelWorld`](super::ModelWorld).
//!
//! Applies the same [`Operation`]s to a [`SimServer`] and projects the
//! driver's state and every client's inbox back onto model identifiers, so
//! the two worlds can be compared with `==`.

use std::time::Duration;

use huddle_proto::{
    ClientMessage, ConnectionId, JoinRequest, MousePosition, PositionUpdate, ServerMessage,
    UserJoined, UserLeft,
};
use huddle_server::{DriverConfig, DriverError};

use super::{
    operation::{
        ClientId, ModelRoomId, Operation, OperationError, OperationResult, display_name, room_name,
    },
    world::{ModelEvent, ObservableState},
};
use crate::SimServer;

/// Connection identifier used for a model client.
pub fn connection_id(client_id: ClientId) -> ConnectionId {
    ConnectionId::from_u64(u64::from(client_id))
}

/// Model client behind a connection identifier, if it is one of ours.
pub fn client_id(connection_id: &ConnectionId) -> Option<ClientId> {
    let value = u64::from_str_radix(connection_id.as_str(), 16).ok()?;
    ClientId::try_from(value).ok()
}

/// Model room behind a room name, if it is one of ours.
pub fn room_id(name: &str) -> Option<ModelRoomId> {
    name.strip_prefix("room-")?.parse().ok()
}

/// The real driver, driven through [`SimServer`].
#[derive(Debug)]
pub struct RealWorld {
    server: SimServer,
    num_clients: usize,
}

impl RealWorld {
    /// Create a world with `num_clients` disconnected clients.
    pub fn new(num_clients: usize, seed: u64, idle_timeout_secs: u64) -> Self {
        let mut config = DriverConfig::default();
        config.connection.idle_timeout = Duration::from_secs(idle_timeout_secs);

        Self { server: SimServer::with_config(seed, config), num_clients }
    }

    /// The wrapped simulation server.
    pub fn server(&self) -> &SimServer {
        &self.server
    }

    /// Apply an operation and return the result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        if let Some(client_id) = op.client_id() {
            if usize::from(client_id) >= self.num_clients {
                return OperationResult::Error(OperationError::UnknownClient);
            }
        }

        let result = match *op {
            Operation::Connect { client_id } => self.server.connect(&connection_id(client_id)),
            Operation::CreateRoom { client_id, room_id } => self
                .server
                .send(&connection_id(client_id), ClientMessage::CreateRoom(room_name(room_id))),
            Operation::Join { client_id, room_id, name } => self.server.send(
                &connection_id(client_id),
                ClientMessage::Join(JoinRequest {
                    room_name: room_name(room_id),
                    username: display_name(name),
                }),
            ),
            Operation::MousePosition { client_id, x, y } => self.server.send(
                &connection_id(client_id),
                ClientMessage::MousePosition(PositionUpdate { x: f64::from(x), y: f64::from(y) }),
            ),
            Operation::Heartbeat { client_id } => self.server.heartbeat(&connection_id(client_id)),
            Operation::Disconnect { client_id } => {
                self.server.disconnect(&connection_id(client_id))
            },
            Operation::AdvanceTime { secs } => {
                self.server.advance(Duration::from_secs(u64::from(secs)));
                Ok(())
            },
            Operation::Tick => self.server.tick(),
        };

        match result {
            Ok(()) => OperationResult::Ok,
            Err(DriverError::ConnectionNotFound(_)) => {
                OperationResult::Error(OperationError::NotConnected)
            },
            Err(DriverError::ConnectionAlreadyExists(_)) => {
                OperationResult::Error(OperationError::AlreadyConnected)
            },
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        let driver = self.server.driver();
        let registry = driver.registry();
        let directory = driver.directory();
        let clients = 0..self.num_clients as ClientId;

        let connected = clients.clone().map(|c| registry.contains(&connection_id(c))).collect();
        let names = clients
            .clone()
            .map(|c| {
                registry
                    .get(&connection_id(c))
                    .and_then(|conn| conn.display_name())
                    .map(str::to_string)
            })
            .collect();

        let rooms = directory
            .room_names()
            .iter()
            .filter_map(|name| {
                let members =
                    directory.members(name)?.filter_map(|(id, _)| client_id(id)).collect();
                let observers = directory.observers(name)?.filter_map(client_id).collect();
                Some((room_id(name)?, members, observers))
            })
            .collect();

        let inboxes = clients
            .map(|c| self.server.inbox(&connection_id(c)).iter().filter_map(project).collect())
            .collect();

        ObservableState { connected, names, rooms, inboxes }
    }
}

/// Project a delivered message onto the model (colors dropped).
fn project(message: &ServerMessage) -> Option<ModelEvent> {
    let event = match message {
        ServerMessage::UserJoined(UserJoined { username, user_id, .. }) => {
            ModelEvent::UserJoined { username: username.clone(), user_id: client_id(user_id)? }
        },
        ServerMessage::MousePosition(MousePosition { username, x, y, .. }) => {
            ModelEvent::MousePosition { username: username.clone(), x: *x as i16, y: *y as i16 }
        },
        ServerMessage::UserLeft(UserLeft { user_id }) => {
            ModelEvent::UserLeft { user_id: client_id(user_id)? }
        },
    };

    Some(event)
}

//! Operations for model-based testing.
//!
//! Operations represent everything a client or the clock can do to the relay.
//! They are generated randomly and applied to both the model and the real
//! driver.

use arbitrary::Arbitrary;

/// Client identifier (0-indexed).
pub type ClientId = u8;

/// Room identifier (u8 keeps the room space small so rooms collide).
pub type ModelRoomId = u8;

/// Display name identifier, mapped onto a small set of names.
pub type NameId = u8;

/// Number of distinct display names operations draw from.
pub const NAME_POOL: u8 = 6;

/// Operations that can be applied to the system.
#[derive(Debug, Clone, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// (Re)connect a client under its fixed connection identifier.
    Connect {
        /// Client connecting.
        client_id: ClientId,
    },

    /// Client sends `createRoom`.
    CreateRoom {
        /// Client performing the operation.
        client_id: ClientId,
        /// Room to create.
        room_id: ModelRoomId,
    },

    /// Client sends `join`.
    Join {
        /// Client joining.
        client_id: ClientId,
        /// Room to join.
        room_id: ModelRoomId,
        /// Display name to join under.
        name: NameId,
    },

    /// Client sends `mousePosition`.
    MousePosition {
        /// Client moving.
        client_id: ClientId,
        /// Horizontal coordinate.
        x: i16,
        /// Vertical coordinate.
        y: i16,
    },

    /// Transport hears a ping or pong from the client.
    Heartbeat {
        /// Client still alive.
        client_id: ClientId,
    },

    /// Client's socket closes.
    Disconnect {
        /// Client disconnecting.
        client_id: ClientId,
    },

    /// Advance virtual time.
    AdvanceTime {
        /// Seconds to advance.
        secs: u8,
    },

    /// Run an idle-timeout sweep.
    Tick,
}

impl Operation {
    /// Client the operation acts for, if any.
    pub fn client_id(&self) -> Option<ClientId> {
        match self {
            Self::Connect { client_id }
            | Self::CreateRoom { client_id, .. }
            | Self::Join { client_id, .. }
            | Self::MousePosition { client_id, .. }
            | Self::Heartbeat { client_id }
            | Self::Disconnect { client_id } => Some(*client_id),
            Self::AdvanceTime { .. } | Self::Tick => None,
        }
    }
}

/// Room name used on the wire for a model room.
///
/// Zero-padded so that string order matches numeric order.
pub fn room_name(room_id: ModelRoomId) -> String {
    format!("room-{room_id:03}")
}

/// Display name used on the wire for a name identifier.
pub fn display_name(name: NameId) -> String {
    format!("user-{}", name % NAME_POOL)
}

/// Result of applying an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation applied.
    Ok,
    /// Operation rejected by the server.
    Error(OperationError),
}

/// Why the server rejected an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// Message from a connection that is not live.
    NotConnected,
    /// Connect for a connection that is already live.
    AlreadyConnected,
    /// Client id outside the world.
    UnknownClient,
}

//! Event envelopes and payloads.
//!
//! Both directions use adjacently tagged JSON: the variant name becomes the
//! `event` field and the payload the `data` field. Payload structs carry the
//! exact camelCase field names existing clients depend on.
//!
//! # Invariants
//!
//! - Decoding never panics on arbitrary input; every failure is a
//!   [`ProtocolError`].
//! - Messages larger than [`MAX_MESSAGE_SIZE`] are rejected before parsing.

use serde::{Deserialize, Serialize};

use crate::{
    ids::{Color, ConnectionId},
    errors::{ProtocolError, Result},
};

/// Largest accepted text message, in bytes.
///
/// Presence events are tiny; anything close to this is a misbehaving client.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Messages sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Create a room (payload is the bare room name)
    CreateRoom(String),
    /// Join a room under a display name
    Join(JoinRequest),
    /// Cursor moved
    MousePosition(PositionUpdate),
}

/// Payload of the `join` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Room to join (created if missing)
    pub room_name: String,
    /// Display name for this connection
    pub username: String,
}

/// Payload of the inbound `mousePosition` event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    /// Horizontal coordinate (opaque to the server)
    pub x: f64,
    /// Vertical coordinate (opaque to the server)
    pub y: f64,
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Someone joined a room you are in
    UserJoined(UserJoined),
    /// Someone in a shared room moved their cursor
    MousePosition(MousePosition),
    /// Someone left a room you are in
    UserLeft(UserLeft),
}

/// Payload of the `userJoined` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoined {
    /// Display name of the joining user
    pub username: String,
    /// Connection identifier of the joining user
    pub user_id: ConnectionId,
    /// Color assigned to the user in this room
    pub color: Color,
}

/// Payload of the outbound `mousePosition` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MousePosition {
    /// Display name of the sender
    pub username: String,
    /// Horizontal coordinate, as sent
    pub x: f64,
    /// Vertical coordinate, as sent
    pub y: f64,
    /// Sender's color in the room this copy is routed through
    pub color: Color,
}

/// Payload of the `userLeft` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeft {
    /// Connection identifier of the departed user
    pub user_id: ConnectionId,
}

fn check_size(text: &str) -> Result<()> {
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: text.len(), max: MAX_MESSAGE_SIZE });
    }
    Ok(())
}

impl ClientMessage {
    /// Parse one inbound text message.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MessageTooLarge` if `text` exceeds
    ///   [`MAX_MESSAGE_SIZE`]
    /// - `ProtocolError::Decode` for malformed JSON, unknown events or
    ///   missing fields
    pub fn decode(text: &str) -> Result<Self> {
        check_size(text)?;
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to the JSON envelope.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Event name as it appears on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::CreateRoom(_) => "createRoom",
            Self::Join(_) => "join",
            Self::MousePosition(_) => "mousePosition",
        }
    }
}

impl ServerMessage {
    /// Serialize to the JSON envelope.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Parse one outbound text message (client side).
    pub fn decode(text: &str) -> Result<Self> {
        check_size(text)?;
        Ok(serde_json::from_str(text)?)
    }

    /// Event name as it appears on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::UserJoined(_) => "userJoined",
            Self::MousePosition(_) => "mousePosition",
            Self::UserLeft(_) => "userLeft",
        }
    }
}

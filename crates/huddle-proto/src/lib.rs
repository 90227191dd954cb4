//! Huddle wire protocol.
//!
//! Every message on the wire is one JSON object of the form
//! `{"event": <name>, "data": <payload>}`. Inbound messages from clients are
//! modelled by [`ClientMessage`], outbound messages by [`ServerMessage`].
//!
//! # Events
//!
//! | Direction | Event | Payload |
//! |---|---|---|
//! | client → server | `createRoom` | room name (string) |
//! | client → server | `join` | `{ roomName, username }` |
//! | client → server | `mousePosition` | `{ x, y }` |
//! | server → client | `userJoined` | `{ username, userId, color }` |
//! | server → client | `mousePosition` | `{ username, x, y, color }` |
//! | server → client | `userLeft` | `{ userId }` |
//!
//! Field names are part of the contract and must not change.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
mod ids;
pub mod message;

pub use errors::{ProtocolError, Result};
pub use ids::{Color, ConnectionId};
pub use message::{
    ClientMessage, JoinRequest, MAX_MESSAGE_SIZE, MousePosition, PositionUpdate, ServerMessage,
    UserJoined, UserLeft,
};

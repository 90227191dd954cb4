//! Model-based testing.
//!
//! [`Operation`]s are applied to both the reference [`ModelWorld`] and the
//! real driver wrapped in [`RealWorld`]; after every step their results and
//! [`ObservableState`]s must be equal.

mod operation;
mod real;
mod world;

pub use operation::{
    ClientId, ModelRoomId, NAME_POOL, NameId, Operation, OperationError, OperationResult,
    display_name, room_name,
};
pub use real::{RealWorld, client_id, connection_id, room_id};
pub use world::{ModelEvent, ModelWorld, ObservableState};

//! Deterministic simulation harness for Huddle relay testing.
//!
//! A virtual clock and seeded RNG ([`SimEnv`]) plus an in-memory stand-in for
//! the WebSocket runtime ([`SimServer`]) make every run reproducible from its
//! seed.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation for model-based
//! testing. Operations are applied to both the model and the real driver, and
//! their observable states are compared.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties of the registry and directory
//! that must hold after every event. Use [`InvariantRegistry::standard()`]
//! for the relay's structural invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod model;
pub mod sim_env;
pub mod sim_server;

pub use invariants::{
    IndexConsistency, Invariant, InvariantRegistry, InvariantResult, LiveParticipants,
    NoAbandonedRooms, RoomSnapshot, SystemSnapshot, Violation, WellFormedColors,
};
pub use model::{
    ClientId, ModelEvent, ModelRoomId, ModelWorld, ObservableState, Operation, OperationError,
    OperationResult, RealWorld,
};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_server::SimServer;

//! Huddle core.
//!
//! Sans-IO building blocks shared by the server and the simulation harness.
//! Nothing in this crate performs I/O, reads the clock or touches an OS RNG;
//! those come in through the [`env::Environment`] trait so the same logic
//! runs unchanged under a virtual clock and a seeded RNG.
//!
//! # Components
//!
//! - [`env::Environment`]: time and randomness source
//! - [`connection::Connection`]: per-connection lifecycle state machine
//! - [`color::random_color`]: per-membership color assignment

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod color;
pub mod connection;
pub mod env;
pub mod error;

pub use color::random_color;
pub use connection::{Connection, ConnectionConfig, ConnectionState, DEFAULT_IDLE_TIMEOUT};
pub use env::Environment;
pub use error::ConnectionError;

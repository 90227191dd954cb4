//! Error types for the Huddle core.
//!
//! Lifecycle errors never reach clients. The driver checks connection state
//! before applying an event, so these only surface as log lines when a
//! transport delivers events out of contract (e.g. after a close).

use thiserror::Error;

use crate::connection::ConnectionState;

/// Lifecycle violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// `operation` is not allowed while the connection is in `state`
    #[error("{operation} not allowed on a {state:?} connection")]
    InvalidState {
        /// State the connection was in
        state: ConnectionState,
        /// What was attempted (`"join"`, `"close"`)
        operation: &'static str,
    },
}

//! Driver error types.
//!
//! Errors returned by [`ServerDriver::process_event`](crate::ServerDriver)
//! and by action execution. Neither kind is ever sent to a client; the runtime
//! logs them and keeps serving.

use huddle_proto::ConnectionId;
use thiserror::Error;

/// Errors that can occur while the driver processes an event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Connection not found in registry.
    ///
    /// A message arrived for an identifier that was never accepted or has
    /// already been torn down. The event is dropped; state is untouched.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// Connection already registered.
    ///
    /// The transport reused an identifier that is still live. This is a
    /// transport bug: identifiers must be unique among live connections.
    #[error("connection already exists: {0}")]
    ConnectionAlreadyExists(ConnectionId),
}

/// Errors from action execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// Delivery to a connection failed.
    ///
    /// The connection's writer is gone, usually because the socket closed
    /// between routing and delivery. Transient; the close event will follow.
    #[error("send failed for connection {connection_id}: {reason}")]
    SendFailed {
        /// Connection that failed
        connection_id: ConnectionId,
        /// Error message
        reason: String,
    },
}

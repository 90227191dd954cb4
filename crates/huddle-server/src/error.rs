//! Runtime error types.

use std::fmt;

use crate::server_error::DriverError;

/// Errors that can occur in the server runtime.
#[derive(Debug)]
pub enum ServerError {
    /// Rejected before serving: unusable bind address, zero tick interval.
    Config(String),

    /// Socket-level failure while serving.
    Transport(String),

    /// A runtime task ended in a state the relay cannot explain.
    Internal(String),

    /// The event router refused an event.
    Driver(DriverError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "invalid server config: {msg}"),
            Self::Transport(msg) => write!(f, "socket failure: {msg}"),
            Self::Internal(msg) => write!(f, "relay fault: {msg}"),
            Self::Driver(err) => write!(f, "event rejected: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Self::Driver(err) = self { Some(err) } else { None }
    }
}

impl From<DriverError> for ServerError {
    fn from(err: DriverError) -> Self {
        Self::Driver(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(io: std::io::Error) -> Self {
        Self::Transport(io.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use huddle_proto::ConnectionId;

    use super::*;

    #[test]
    fn io_errors_become_transport_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err = ServerError::from(io);

        assert!(matches!(err, ServerError::Transport(_)));
        assert_eq!(err.to_string(), "socket failure: address in use");
    }

    #[test]
    fn driver_error_is_source() {
        let err = ServerError::from(DriverError::ConnectionNotFound(ConnectionId::from("a")));

        assert_eq!(err.to_string(), "event rejected: connection not found: a");
        assert!(err.source().is_some());
    }
}

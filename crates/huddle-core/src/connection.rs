//! Per-connection lifecycle state machine.
//!
//! Tracks who a connection claims to be and when it was last heard from.
//! Pure state: time is passed in, nothing here performs I/O.
//!
//! # State Machine
//!
//! ```text
//! ┌───────────┐   join    ┌────────┐
//! │ Anonymous │──────────>│ Joined │──┐ join (rename)
//! └───────────┘           └────────┘<─┘
//!       │                      │
//!       │ close / idle timeout │ close / idle timeout
//!       ↓                      ↓
//!                ┌────────┐
//!                │ Closed │
//!                └────────┘
//! ```

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use crate::error::ConnectionError;

/// Maximum time allowed without any inbound message or heartbeat before the
/// connection is considered dead and closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected, no join yet
    Anonymous,
    /// Joined at least one room
    Joined,
    /// Disconnected (terminal)
    Closed,
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Idle timeout before disconnecting
    pub idle_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { idle_timeout: DEFAULT_IDLE_TIMEOUT }
    }
}

/// Connection state machine
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct Connection<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Current state
    state: ConnectionState,
    /// Display name from the most recent join
    display_name: Option<String>,
    /// When the transport accepted the connection
    connected_at: I,
    /// Last inbound message
    last_activity: I,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a new connection in [`ConnectionState::Anonymous`] state
    pub fn new(now: I) -> Self {
        Self {
            state: ConnectionState::Anonymous,
            display_name: None,
            connected_at: now,
            last_activity: now,
        }
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Display name from the most recent join. `None` before any join.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// When the connection was accepted.
    #[must_use]
    pub fn connected_at(&self) -> I {
        self.connected_at
    }

    /// Record a join under `name`. Last write wins.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if the connection is closed
    pub fn record_join(&mut self, name: impl Into<String>, now: I) -> Result<(), ConnectionError> {
        if self.state == ConnectionState::Closed {
            return Err(ConnectionError::InvalidState { state: self.state, operation: "join" });
        }

        self.display_name = Some(name.into());
        self.state = ConnectionState::Joined;
        self.last_activity = now;
        Ok(())
    }

    /// Mark connection as active (call when receiving messages).
    pub fn update_activity(&mut self, now: I) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Mark connection as closed.
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Elapsed time since last activity, if `idle_timeout` is exceeded.
    /// `None` otherwise, and always `None` once closed.
    #[must_use]
    pub fn check_timeout(&self, now: I, idle_timeout: Duration) -> Option<Duration> {
        if self.state == ConnectionState::Closed || now < self.last_activity {
            return None;
        }

        let elapsed = now - self.last_activity;
        if elapsed > idle_timeout { Some(elapsed) } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_connection_is_anonymous() {
        let conn = Connection::new(Instant::now());
        assert_eq!(conn.state(), ConnectionState::Anonymous);
        assert!(conn.display_name().is_none());
    }

    #[test]
    fn join_sets_name_and_state() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0);

        conn.record_join("alice", t0).unwrap();
        assert_eq!(conn.state(), ConnectionState::Joined);
        assert_eq!(conn.display_name(), Some("alice"));
    }

    #[test]
    fn rejoin_overwrites_name() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0);

        conn.record_join("alice", t0).unwrap();
        conn.record_join("alicia", t0).unwrap();
        assert_eq!(conn.display_name(), Some("alicia"));
        assert_eq!(conn.state(), ConnectionState::Joined);
    }

    #[test]
    fn join_after_close_fails() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0);
        conn.close();

        let result = conn.record_join("alice", t0);
        assert_eq!(
            result,
            Err(ConnectionError::InvalidState { state: ConnectionState::Closed, operation: "join" })
        );
        assert!(conn.display_name().is_none());
    }

    #[test]
    fn idle_timeout_detected_after_threshold() {
        let t0 = Instant::now();
        let conn = Connection::new(t0);
        let timeout = Duration::from_secs(60);

        assert!(conn.check_timeout(t0 + Duration::from_secs(59), timeout).is_none());
        assert!(conn.check_timeout(t0 + Duration::from_secs(60), timeout).is_none());
        assert_eq!(
            conn.check_timeout(t0 + Duration::from_secs(61), timeout),
            Some(Duration::from_secs(61))
        );
    }

    #[test]
    fn activity_resets_idle_timer() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0);
        let timeout = Duration::from_secs(60);

        conn.update_activity(t0 + Duration::from_secs(50));
        assert!(conn.check_timeout(t0 + Duration::from_secs(100), timeout).is_none());
        assert!(conn.check_timeout(t0 + Duration::from_secs(111), timeout).is_some());
    }

    #[test]
    fn closed_connection_never_times_out() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0);
        conn.close();

        assert!(conn.check_timeout(t0 + Duration::from_secs(3600), Duration::from_secs(1)).is_none());
    }
}

//! Wall-clock environment for the production relay.
//!
//! Monotonic `std::time::Instant` for idle tracking and getrandom for colors
//! and connection identifiers. Runs are not reproducible; simulations use a
//! seeded environment.

use huddle_core::env::Environment;

/// Real clock plus OS randomness.
///
/// Connection identifiers are drawn from this RNG, so it must be
/// unpredictable: an identifier doubles as the `userId` other clients see.
///
/// # Panics
///
/// Panics if the OS RNG fails. A relay that cannot mint identifiers cannot
/// accept connections, and RNG failure indicates an OS-level fault.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// System environment. Stateless, so clones are free.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}

//! Time and randomness as a trait.
//!
//! The relay never reads the clock or the OS RNG itself. Everything it needs
//! comes through [`Environment`], so a simulation can swap in a virtual clock
//! and a seeded RNG and replay a run exactly.

use std::time::Duration;

/// Source of time and randomness for the relay.
///
/// `now()` must be monotonic. Neither method reports errors; an environment
/// that cannot produce time or entropy has nothing useful left to do.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Point in time; subtracting two yields the elapsed `Duration`.
    type Instant: Copy + Ord + Send + Sync + std::fmt::Debug + std::ops::Sub<Output = Duration>;

    /// Current time. Never earlier than a previous call.
    fn now(&self) -> Self::Instant;

    /// Fill `buf` with random bytes. Seeded environments repeat the same
    /// stream for the same seed.
    fn random_bytes(&self, buf: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Used for connection identifiers.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a uniformly distributed 24-bit value.
    fn random_u24(&self) -> u32 {
        let mut bytes = [0u8; 3];
        self.random_bytes(&mut bytes);
        u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
    }
}

//! Structural invariants of the relay.
//!
//! A check looks at one [`SystemSnapshot`] (the driver's registry and
//! directory frozen at a point in time) and reports what is wrong with it.
//! Property tests and the fuzzer take a snapshot after every event and run
//! the whole [`InvariantRegistry`] over it.
//!
//! ```ignore
//! let snapshot = SystemSnapshot::from_driver(server.driver());
//! InvariantRegistry::standard().assert_all(&snapshot, "after join");
//! ```

mod checks;
mod snapshot;

use std::fmt;

pub use checks::{IndexConsistency, LiveParticipants, NoAbandonedRooms, WellFormedColors};
pub use snapshot::{RoomSnapshot, SystemSnapshot};

/// Outcome of one check.
pub type InvariantResult = Result<(), Violation>;

/// A broken invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Which invariant failed.
    pub invariant: &'static str,
    /// The offending state, in words.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property every reachable relay state satisfies.
pub trait Invariant {
    /// Short name used in reports.
    fn name(&self) -> &'static str;

    /// Inspect `state`; stop at the first problem found.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;

    /// Violation of this invariant with the given description.
    fn violation(&self, message: String) -> Violation {
        Violation { invariant: self.name(), message }
    }
}

/// Ordered collection of invariants.
#[derive(Default)]
pub struct InvariantRegistry {
    checks: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// Registry with no checks.
    pub fn new() -> Self {
        Self::default()
    }

    /// The four structural checks: [`NoAbandonedRooms`],
    /// [`LiveParticipants`], [`IndexConsistency`] and [`WellFormedColors`].
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(NoAbandonedRooms);
        registry.add(LiveParticipants);
        registry.add(IndexConsistency);
        registry.add(WellFormedColors);
        registry
    }

    /// Append a check.
    pub fn add(&mut self, invariant: impl Invariant + 'static) {
        self.checks.push(Box::new(invariant));
    }

    /// Run every check; collect one violation per failing invariant.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let mut violations = Vec::new();
        for invariant in &self.checks {
            if let Err(violation) = invariant.check(state) {
                violations.push(violation);
            }
        }

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Like [`check_all`](Self::check_all), but panics with every violation
    /// listed under `context`.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        let Err(violations) = self.check_all(state) else {
            return;
        };

        let report = violations.iter().fold(String::new(), |mut report, violation| {
            report.push_str("\n  ");
            report.push_str(&violation.to_string());
            report
        });
        panic!("{} invariant(s) broken {context}:{report}", violations.len());
    }

    /// Number of checks.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// `true` when no checks are registered.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

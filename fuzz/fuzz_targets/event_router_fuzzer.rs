//! Fuzz target for the event router.
//!
//! # Strategy
//!
//! Arbitrary operation sequences (connects, creates, joins, cursor moves,
//! heartbeats, disconnects, clock jumps and idle sweeps) are applied to both the
//! reference model and the real driver.
//!
//! # Invariants
//!
//! - Model and driver return the same result for every operation
//! - Model and driver expose the same rooms, names and deliveries
//! - Every room has a member or an observer
//! - Rooms only hold live connections
//! - Directory indices agree in both directions
//! - Every color is `#rrggbb`

#![no_main]

use arbitrary::Arbitrary;
use huddle_harness::{InvariantRegistry, ModelWorld, Operation, RealWorld, SystemSnapshot};
use libfuzzer_sys::fuzz_target;

const IDLE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Arbitrary)]
struct Scenario {
    seed: u64,
    clients: u8,
    operations: Vec<Operation>,
}

/// Fold client identifiers into range so few operations are trivially
/// rejected.
fn normalize(op: Operation, num_clients: u8) -> Operation {
    let fold = |client_id: u8| client_id % num_clients;
    match op {
        Operation::Connect { client_id } => Operation::Connect { client_id: fold(client_id) },
        Operation::CreateRoom { client_id, room_id } => {
            Operation::CreateRoom { client_id: fold(client_id), room_id: room_id % 8 }
        },
        Operation::Join { client_id, room_id, name } => {
            Operation::Join { client_id: fold(client_id), room_id: room_id % 8, name }
        },
        Operation::MousePosition { client_id, x, y } => {
            Operation::MousePosition { client_id: fold(client_id), x, y }
        },
        Operation::Heartbeat { client_id } => Operation::Heartbeat { client_id: fold(client_id) },
        Operation::Disconnect { client_id } => Operation::Disconnect { client_id: fold(client_id) },
        op @ (Operation::AdvanceTime { .. } | Operation::Tick) => op,
    }
}

fuzz_target!(|scenario: Scenario| {
    let num_clients = scenario.clients % 6 + 1;
    let mut model = ModelWorld::new(usize::from(num_clients), IDLE_TIMEOUT_SECS);
    let mut real = RealWorld::new(usize::from(num_clients), scenario.seed, IDLE_TIMEOUT_SECS);
    let invariants = InvariantRegistry::standard();

    for op in scenario.operations.into_iter().take(256) {
        let op = normalize(op, num_clients);

        let model_result = model.apply(&op);
        let real_result = real.apply(&op);
        assert_eq!(model_result, real_result, "result divergence on {op:?}");

        assert_eq!(
            model.observable_state(),
            real.observable_state(),
            "state divergence after {op:?}"
        );

        let snapshot = SystemSnapshot::from_driver(real.server().driver());
        invariants.assert_all(&snapshot, &format!("after {op:?}"));
    }
});

//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! driver behaves identically to the reference model.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      ModelWorld    RealWorld      Compare
//!      (reference)   (SimServer)    Results + State
//! ```

use huddle_harness::{
    ClientId, InvariantRegistry, ModelEvent, ModelRoomId, ModelWorld, Operation, OperationError,
    OperationResult, RealWorld, SystemSnapshot, model::display_name,
};
use proptest::prelude::*;

const IDLE_TIMEOUT_SECS: u64 = 10;

/// Strategy for generating operations with valid client IDs.
///
/// Rooms come from a handful of ids so clients keep colliding in them.
fn operation_strategy(num_clients: usize) -> impl Strategy<Value = Operation> {
    let client_id = 0..num_clients as ClientId;
    let room_id = 0..4 as ModelRoomId;
    let name = any::<u8>();

    prop_oneof![
        1 => client_id.clone().prop_map(|c| Operation::Connect { client_id: c }),
        2 => (client_id.clone(), room_id.clone()).prop_map(|(c, r)| Operation::CreateRoom {
            client_id: c,
            room_id: r
        }),
        4 => (client_id.clone(), room_id, name).prop_map(|(c, r, n)| Operation::Join {
            client_id: c,
            room_id: r,
            name: n
        }),
        4 => (client_id.clone(), any::<i16>(), any::<i16>()).prop_map(|(c, x, y)| {
            Operation::MousePosition { client_id: c, x, y }
        }),
        2 => client_id.clone().prop_map(|c| Operation::Heartbeat { client_id: c }),
        1 => client_id.prop_map(|c| Operation::Disconnect { client_id: c }),
        1 => (0..8u8).prop_map(|secs| Operation::AdvanceTime { secs }),
        1 => Just(Operation::Tick),
    ]
}

/// Connect every client so early operations are not all rejected.
fn connect_all(model: &mut ModelWorld, real: &mut RealWorld, num_clients: usize) {
    for client_id in 0..num_clients as ClientId {
        let op = Operation::Connect { client_id };
        assert_eq!(model.apply(&op), OperationResult::Ok);
        assert_eq!(real.apply(&op), OperationResult::Ok);
    }
}

proptest! {
    /// Results and observable state match after every operation.
    #[test]
    fn prop_model_matches_real(
        seed in any::<u64>(),
        num_clients in 2..5usize,
        ops in prop::collection::vec(operation_strategy(4), 0..60)
    ) {
        let mut model = ModelWorld::new(num_clients, IDLE_TIMEOUT_SECS);
        let mut real = RealWorld::new(num_clients, seed, IDLE_TIMEOUT_SECS);
        connect_all(&mut model, &mut real, num_clients);

        for (i, op) in ops.iter().enumerate() {
            let model_result = model.apply(op);
            let real_result = real.apply(op);

            prop_assert_eq!(
                model_result,
                real_result,
                "Divergence at operation {}: {:?}",
                i, op
            );

            prop_assert_eq!(
                model.observable_state(),
                real.observable_state(),
                "State divergence after operation {}: {:?}",
                i, op
            );
        }
    }

    /// Structural invariants hold after every operation.
    #[test]
    fn prop_driver_invariants(
        seed in any::<u64>(),
        num_clients in 1..5usize,
        ops in prop::collection::vec(operation_strategy(4), 0..100)
    ) {
        let registry = InvariantRegistry::standard();
        let mut real = RealWorld::new(num_clients, seed, IDLE_TIMEOUT_SECS);

        for (i, op) in ops.iter().enumerate() {
            let _ = real.apply(op);

            let snapshot = SystemSnapshot::from_driver(real.server().driver());
            if let Err(violations) = registry.check_all(&snapshot) {
                prop_assert!(false, "after operation {} ({:?}): {:?}", i, op, violations);
            }
        }
    }

    /// Nobody ever hears about their own actions.
    #[test]
    fn prop_no_self_delivery(
        num_clients in 2..5usize,
        ops in prop::collection::vec(operation_strategy(4), 0..80)
    ) {
        let mut model = ModelWorld::new(num_clients, IDLE_TIMEOUT_SECS);
        let mut real = RealWorld::new(num_clients, 0, IDLE_TIMEOUT_SECS);
        connect_all(&mut model, &mut real, num_clients);

        for op in &ops {
            let _ = real.apply(op);
        }

        let state = real.observable_state();
        for (receiver, inbox) in state.inboxes.iter().enumerate() {
            for event in inbox {
                let about = match event {
                    ModelEvent::UserJoined { user_id, .. } | ModelEvent::UserLeft { user_id } => {
                        Some(*user_id)
                    },
                    ModelEvent::MousePosition { .. } => None,
                };
                prop_assert_ne!(about, Some(receiver as ClientId));
            }
        }
    }

    /// Same seed, same operations, same outcome.
    #[test]
    fn prop_deterministic_replay(
        seed in any::<u64>(),
        ops in prop::collection::vec(operation_strategy(3), 0..40)
    ) {
        let run = |ops: &[Operation]| {
            let mut real = RealWorld::new(3, seed, IDLE_TIMEOUT_SECS);
            for op in ops {
                let _ = real.apply(op);
            }
            let colors: Vec<_> = real
                .server()
                .driver()
                .directory()
                .room_names()
                .into_iter()
                .flat_map(|room| {
                    let directory = real.server().driver().directory();
                    directory
                        .members(&room)
                        .into_iter()
                        .flatten()
                        .map(|(_, member)| member.color.clone())
                        .collect::<Vec<_>>()
                })
                .collect();
            (real.observable_state(), colors)
        };

        prop_assert_eq!(run(&ops), run(&ops));
    }

    /// Messages from clients that never connected are rejected by both.
    #[test]
    fn prop_unconnected_sender_rejected(
        client_id in 0..4u8,
        room_id in 0..4u8,
    ) {
        let mut model = ModelWorld::new(4, IDLE_TIMEOUT_SECS);
        let mut real = RealWorld::new(4, 0, IDLE_TIMEOUT_SECS);
        let op = Operation::Join { client_id, room_id, name: 0 };

        prop_assert_eq!(model.apply(&op), OperationResult::Error(OperationError::NotConnected));
        prop_assert_eq!(real.apply(&op), OperationResult::Error(OperationError::NotConnected));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worlds(n: usize) -> (ModelWorld, RealWorld) {
        let mut model = ModelWorld::new(n, IDLE_TIMEOUT_SECS);
        let mut real = RealWorld::new(n, 7, IDLE_TIMEOUT_SECS);
        connect_all(&mut model, &mut real, n);
        (model, real)
    }

    fn apply_both(model: &mut ModelWorld, real: &mut RealWorld, ops: &[Operation]) {
        for op in ops {
            assert_eq!(model.apply(op), real.apply(op), "{op:?}");
        }
    }

    #[test]
    fn observer_sees_members_move() {
        let (mut model, mut real) = worlds(3);
        apply_both(&mut model, &mut real, &[
            Operation::CreateRoom { client_id: 0, room_id: 1 },
            Operation::Join { client_id: 1, room_id: 1, name: 1 },
            Operation::Join { client_id: 2, room_id: 1, name: 2 },
            Operation::MousePosition { client_id: 1, x: 10, y: -4 },
            Operation::Disconnect { client_id: 2 },
        ]);

        let state = real.observable_state();
        assert_eq!(state, model.observable_state());
        assert_eq!(state.inboxes[0], vec![
            ModelEvent::UserJoined { username: display_name(1), user_id: 1 },
            ModelEvent::UserJoined { username: display_name(2), user_id: 2 },
            ModelEvent::MousePosition { username: display_name(1), x: 10, y: -4 },
            ModelEvent::UserLeft { user_id: 2 },
        ]);
        assert_eq!(state.rooms, vec![(1, vec![1], vec![0])]);
    }

    #[test]
    fn last_member_leaving_deletes_room_under_observer() {
        let (mut model, mut real) = worlds(2);
        apply_both(&mut model, &mut real, &[
            Operation::CreateRoom { client_id: 0, room_id: 2 },
            Operation::Join { client_id: 1, room_id: 2, name: 1 },
            Operation::Disconnect { client_id: 1 },
        ]);

        let state = real.observable_state();
        assert_eq!(state, model.observable_state());
        assert!(state.rooms.is_empty());
    }

    #[test]
    fn reconnect_after_idle_close() {
        let (mut model, mut real) = worlds(2);
        apply_both(&mut model, &mut real, &[
            Operation::Join { client_id: 0, room_id: 0, name: 0 },
            Operation::AdvanceTime { secs: 11 },
            Operation::Tick,
            Operation::Connect { client_id: 0 },
            Operation::Connect { client_id: 1 },
        ]);

        let state = real.observable_state();
        assert_eq!(state, model.observable_state());
        assert_eq!(state.connected, vec![true, true]);
        assert!(state.rooms.is_empty());
    }
}

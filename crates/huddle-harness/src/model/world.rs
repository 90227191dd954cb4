//! Model world: the reference implementation.
//!
//! A deliberately naive rendition of the relay's rules over small integer
//! identifiers. It is the oracle the real driver is compared against, so it
//! favors obviousness over efficiency: rooms are scanned linearly, nothing is
//! indexed.

use std::collections::{BTreeMap, BTreeSet};

use super::operation::{
    ClientId, ModelRoomId, Operation, OperationError, OperationResult, display_name,
};

/// Name reported for senders that never joined.
const UNKNOWN: &str = "unknown";

/// A delivery, as the receiving client sees it (colors are random and left
/// out).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    /// `userJoined`
    UserJoined {
        /// Name the user joined under.
        username: String,
        /// Who joined.
        user_id: ClientId,
    },
    /// `mousePosition`
    MousePosition {
        /// Sender's current display name.
        username: String,
        /// Horizontal coordinate.
        x: i16,
        /// Vertical coordinate.
        y: i16,
    },
    /// `userLeft`
    UserLeft {
        /// Who left.
        user_id: ClientId,
    },
}

/// Observable state for oracle comparison.
///
/// This is the subset of world state that can be compared against the real
/// driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Per-client liveness.
    pub connected: Vec<bool>,
    /// Per-client display name (`None` if disconnected or never joined).
    pub names: Vec<Option<String>>,
    /// Every room with its members and observers, all sorted.
    pub rooms: Vec<(ModelRoomId, Vec<ClientId>, Vec<ClientId>)>,
    /// Per-client deliveries, in order.
    pub inboxes: Vec<Vec<ModelEvent>>,
}

#[derive(Debug, Clone, Default)]
struct ModelClient {
    connected: bool,
    name: Option<String>,
    last_activity: u64,
}

#[derive(Debug, Clone, Default)]
struct ModelRoom {
    members: BTreeMap<ClientId, String>,
    observers: BTreeSet<ClientId>,
}

/// Model world.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    clients: Vec<ModelClient>,
    rooms: BTreeMap<ModelRoomId, ModelRoom>,
    inboxes: Vec<Vec<ModelEvent>>,
    /// Virtual time in seconds
    clock: u64,
    idle_timeout_secs: u64,
}

impl ModelWorld {
    /// Create a world with `num_clients` disconnected clients.
    pub fn new(num_clients: usize, idle_timeout_secs: u64) -> Self {
        Self {
            clients: vec![ModelClient::default(); num_clients],
            rooms: BTreeMap::new(),
            inboxes: vec![Vec::new(); num_clients],
            clock: 0,
            idle_timeout_secs,
        }
    }

    /// Number of clients in the world.
    pub fn num_clients(&self) -> usize {
        self.clients.len()
    }

    /// Apply an operation and return the result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        if let Some(client_id) = op.client_id() {
            if usize::from(client_id) >= self.clients.len() {
                return OperationResult::Error(OperationError::UnknownClient);
            }
        }

        match *op {
            Operation::Connect { client_id } => self.apply_connect(client_id),
            Operation::CreateRoom { client_id, room_id } => {
                self.with_live_sender(client_id, |world| world.apply_create(client_id, room_id))
            },
            Operation::Join { client_id, room_id, name } => {
                self.with_live_sender(client_id, |world| {
                    world.apply_join(client_id, room_id, display_name(name));
                })
            },
            Operation::MousePosition { client_id, x, y } => {
                self.with_live_sender(client_id, |world| world.apply_mouse(client_id, x, y))
            },
            Operation::Heartbeat { client_id } => {
                let clock = self.clock;
                let client = &mut self.clients[usize::from(client_id)];
                if client.connected {
                    client.last_activity = clock;
                }
                OperationResult::Ok
            },
            Operation::Disconnect { client_id } => {
                if self.clients[usize::from(client_id)].connected {
                    self.apply_disconnect(client_id, &BTreeSet::new());
                }
                OperationResult::Ok
            },
            Operation::AdvanceTime { secs } => {
                self.clock += u64::from(secs);
                OperationResult::Ok
            },
            Operation::Tick => {
                self.apply_tick();
                OperationResult::Ok
            },
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            connected: self.clients.iter().map(|c| c.connected).collect(),
            names: self.clients.iter().map(|c| c.name.clone()).collect(),
            rooms: self
                .rooms
                .iter()
                .map(|(id, room)| {
                    (
                        *id,
                        room.members.keys().copied().collect(),
                        room.observers.iter().copied().collect(),
                    )
                })
                .collect(),
            inboxes: self.inboxes.clone(),
        }
    }

    fn apply_connect(&mut self, client_id: ClientId) -> OperationResult {
        let clock = self.clock;
        let client = &mut self.clients[usize::from(client_id)];
        if client.connected {
            return OperationResult::Error(OperationError::AlreadyConnected);
        }

        *client = ModelClient { connected: true, name: None, last_activity: clock };
        OperationResult::Ok
    }

    /// Run `f` for a message from `client_id` if it is connected.
    fn with_live_sender(
        &mut self,
        client_id: ClientId,
        f: impl FnOnce(&mut Self),
    ) -> OperationResult {
        let clock = self.clock;
        let client = &mut self.clients[usize::from(client_id)];
        if !client.connected {
            return OperationResult::Error(OperationError::NotConnected);
        }

        client.last_activity = clock;
        f(self);
        OperationResult::Ok
    }

    fn apply_create(&mut self, client_id: ClientId, room_id: ModelRoomId) {
        let room = self.rooms.entry(room_id).or_default();
        if !room.members.contains_key(&client_id) {
            room.observers.insert(client_id);
        }
    }

    fn apply_join(&mut self, client_id: ClientId, room_id: ModelRoomId, name: String) {
        self.clients[usize::from(client_id)].name = Some(name.clone());

        let room = self.rooms.entry(room_id).or_default();
        room.observers.remove(&client_id);
        room.members.insert(client_id, name.clone());

        self.broadcast(
            room_id,
            client_id,
            &BTreeSet::new(),
            &ModelEvent::UserJoined { username: name, user_id: client_id },
        );
    }

    fn apply_mouse(&mut self, client_id: ClientId, x: i16, y: i16) {
        let username = self.clients[usize::from(client_id)]
            .name
            .clone()
            .unwrap_or_else(|| UNKNOWN.to_string());

        let rooms: Vec<ModelRoomId> = self
            .rooms
            .iter()
            .filter(|(_, room)| room.members.contains_key(&client_id))
            .map(|(id, _)| *id)
            .collect();

        for room_id in rooms {
            let event = ModelEvent::MousePosition { username: username.clone(), x, y };
            self.broadcast(room_id, client_id, &BTreeSet::new(), &event);
        }
    }

    /// Disconnect cascade. `closing` connections receive nothing.
    fn apply_disconnect(&mut self, client_id: ClientId, closing: &BTreeSet<ClientId>) {
        let member_of: Vec<ModelRoomId> = self
            .rooms
            .iter()
            .filter(|(_, room)| room.members.contains_key(&client_id))
            .map(|(id, _)| *id)
            .collect();

        for room_id in member_of {
            let Some(room) = self.rooms.get_mut(&room_id) else { continue };
            room.members.remove(&client_id);

            if room.members.is_empty() {
                self.rooms.remove(&room_id);
            } else {
                let event = ModelEvent::UserLeft { user_id: client_id };
                self.broadcast(room_id, client_id, closing, &event);
            }
        }

        let observing: Vec<ModelRoomId> = self
            .rooms
            .iter()
            .filter(|(_, room)| room.observers.contains(&client_id))
            .map(|(id, _)| *id)
            .collect();

        for room_id in observing {
            let Some(room) = self.rooms.get_mut(&room_id) else { continue };
            room.observers.remove(&client_id);

            if room.members.is_empty() && room.observers.is_empty() {
                self.rooms.remove(&room_id);
            }
        }

        let client = &mut self.clients[usize::from(client_id)];
        client.connected = false;
        client.name = None;
    }

    /// Close every connection idle for longer than the timeout, lowest id
    /// first. All of them stop receiving before the first is torn down.
    fn apply_tick(&mut self) {
        let clock = self.clock;
        let timeout = self.idle_timeout_secs;

        let expired: BTreeSet<ClientId> = self
            .clients
            .iter()
            .enumerate()
            .filter(|(_, c)| c.connected && clock.saturating_sub(c.last_activity) > timeout)
            .map(|(i, _)| i as ClientId)
            .collect();

        for &client_id in &expired {
            self.apply_disconnect(client_id, &expired);
        }
    }

    /// Deliver `event` to the room's members then observers, except `sender`
    /// and anyone in `closing`.
    fn broadcast(
        &mut self,
        room_id: ModelRoomId,
        sender: ClientId,
        closing: &BTreeSet<ClientId>,
        event: &ModelEvent,
    ) {
        let Some(room) = self.rooms.get(&room_id) else { return };

        let targets: Vec<ClientId> = room
            .members
            .keys()
            .chain(room.observers.iter())
            .copied()
            .filter(|target| *target != sender && !closing.contains(target))
            .collect();

        for target in targets {
            self.inboxes[usize::from(target)].push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(n: usize) -> ModelWorld {
        let mut world = ModelWorld::new(n, 10);
        for client_id in 0..n as ClientId {
            assert_eq!(world.apply(&Operation::Connect { client_id }), OperationResult::Ok);
        }
        world
    }

    #[test]
    fn join_announces_to_existing_members() {
        let mut world = connected(2);
        world.apply(&Operation::Join { client_id: 0, room_id: 1, name: 0 });
        world.apply(&Operation::Join { client_id: 1, room_id: 1, name: 1 });

        let state = world.observable_state();
        assert_eq!(
            state.inboxes[0],
            vec![ModelEvent::UserJoined { username: display_name(1), user_id: 1 }]
        );
        assert!(state.inboxes[1].is_empty());
    }

    #[test]
    fn message_from_disconnected_client_is_rejected() {
        let mut world = ModelWorld::new(1, 10);

        assert_eq!(
            world.apply(&Operation::CreateRoom { client_id: 0, room_id: 0 }),
            OperationResult::Error(OperationError::NotConnected)
        );
        assert_eq!(world.apply(&Operation::Tick), OperationResult::Ok);
    }

    #[test]
    fn heartbeats_hold_off_the_idle_sweep() {
        let mut world = connected(2);
        world.apply(&Operation::Join { client_id: 0, room_id: 1, name: 0 });
        world.apply(&Operation::Join { client_id: 1, room_id: 1, name: 1 });

        for _ in 0..10 {
            world.apply(&Operation::AdvanceTime { secs: 6 });
            world.apply(&Operation::Heartbeat { client_id: 0 });
            world.apply(&Operation::Tick);
        }

        let state = world.observable_state();
        assert_eq!(state.connected, vec![true, false]);
        assert_eq!(state.rooms, vec![(1, vec![0], vec![])]);
    }

    #[test]
    fn idle_clients_are_dropped_on_tick() {
        let mut world = connected(2);
        world.apply(&Operation::Join { client_id: 0, room_id: 1, name: 0 });
        world.apply(&Operation::AdvanceTime { secs: 6 });
        world.apply(&Operation::Join { client_id: 1, room_id: 1, name: 1 });
        world.apply(&Operation::AdvanceTime { secs: 6 });
        world.apply(&Operation::Tick);

        let state = world.observable_state();
        assert_eq!(state.connected, vec![false, true]);
        assert_eq!(state.rooms, vec![(1, vec![1], vec![])]);
        assert_eq!(state.inboxes[1], vec![ModelEvent::UserLeft { user_id: 0 }]);
    }
}

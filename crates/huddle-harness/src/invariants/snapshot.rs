//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the driver's registry and directory at a point in time.
//! Invariants operate on snapshots rather than live state so every check sees
//! the same state.

use std::collections::{BTreeMap, BTreeSet};

use huddle_core::env::Environment;
use huddle_proto::{Color, ConnectionId};
use huddle_server::ServerDriver;

/// Snapshot of the entire relay.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Registered connections.
    pub connections: BTreeSet<ConnectionId>,
    /// Rooms by name.
    pub rooms: BTreeMap<String, RoomSnapshot>,
    /// Reverse index: rooms each connection is a member of.
    pub memberships: BTreeMap<ConnectionId, BTreeSet<String>>,
    /// Reverse index: rooms each connection observes.
    pub observing: BTreeMap<ConnectionId, BTreeSet<String>>,
}

/// Snapshot of one room.
#[derive(Debug, Clone, Default)]
pub struct RoomSnapshot {
    /// Members with their color in this room.
    pub members: BTreeMap<ConnectionId, Color>,
    /// Observers.
    pub observers: BTreeSet<ConnectionId>,
}

impl SystemSnapshot {
    /// Create an empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the state of a driver.
    ///
    /// Reverse indices are read for every registered connection and for every
    /// connection found in a room, so entries for unregistered connections
    /// show up too.
    pub fn from_driver<E: Environment>(driver: &ServerDriver<E>) -> Self {
        let directory = driver.directory();
        let connections: BTreeSet<ConnectionId> =
            driver.registry().iter().map(|(id, _)| id.clone()).collect();

        let mut rooms = BTreeMap::new();
        for name in directory.room_names() {
            let members = directory
                .members(&name)
                .map(|members| members.map(|(id, m)| (id.clone(), m.color.clone())).collect())
                .unwrap_or_default();
            let observers =
                directory.observers(&name).map(|o| o.cloned().collect()).unwrap_or_default();
            rooms.insert(name, RoomSnapshot { members, observers });
        }

        let mut everyone = connections.clone();
        for room in rooms.values() {
            everyone.extend(room.members.keys().cloned());
            everyone.extend(room.observers.iter().cloned());
        }

        let mut memberships = BTreeMap::new();
        let mut observing = BTreeMap::new();
        for id in everyone {
            let member_of: BTreeSet<String> = directory.rooms_containing(&id).into_iter().collect();
            let observer_of: BTreeSet<String> =
                directory.rooms_observed_by(&id).into_iter().collect();
            if !member_of.is_empty() {
                memberships.insert(id.clone(), member_of);
            }
            if !observer_of.is_empty() {
                observing.insert(id, observer_of);
            }
        }

        Self { connections, rooms, memberships, observing }
    }
}

//! Room directory.
//!
//! Maps room names to their members and keeps the reverse index
//! (connection → rooms) needed for the disconnect cascade. Both directions are
//! updated together, so every lookup sees a consistent snapshot.
//!
//! Rooms are created lazily by `create` or `join` and deleted the moment their
//! member set becomes empty. Besides members, a room may have *observers*:
//! connections that created the room but never joined it. Observers hear the
//! room's broadcasts but have no name or color there. A room whose last
//! observer leaves without anyone having joined is deleted as well.
//!
//! The broadcast audience of a room (members plus observers) is derived from
//! this structure only. The transport never decides who is in a room.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use huddle_proto::{Color, ConnectionId};

/// A connection's participation in one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Display name captured at join time
    pub name: String,
    /// Color assigned for this room
    pub color: Color,
}

/// Per-room state.
#[derive(Debug, Clone, Default)]
struct Room {
    /// Joined connections, ordered for deterministic fan-out
    members: BTreeMap<ConnectionId, Member>,
    /// Creators that have not joined
    observers: BTreeSet<ConnectionId>,
}

impl Room {
    fn is_abandoned(&self) -> bool {
        self.members.is_empty() && self.observers.is_empty()
    }
}

/// Outcome of removing a connection from one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomExit {
    /// Room the connection was removed from
    pub room: String,
    /// Whether the room was deleted as a result
    pub deleted: bool,
}

/// Everything a connection was removed from during a disconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionRemoval {
    /// Rooms the connection was a member of, sorted by name
    pub memberships: Vec<RoomExit>,
    /// Rooms the connection only observed, sorted by name
    pub observed: Vec<RoomExit>,
}

impl ConnectionRemoval {
    /// Whether the connection was in no room at all.
    pub fn is_empty(&self) -> bool {
        self.memberships.is_empty() && self.observed.is_empty()
    }
}

/// Directory of rooms and their members.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    /// Room name → room state
    rooms: HashMap<String, Room>,
    /// Connection → rooms it is a member of
    memberships: HashMap<ConnectionId, BTreeSet<String>>,
    /// Connection → rooms it observes
    observing: HashMap<ConnectionId, BTreeSet<String>>,
}

impl RoomDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty room if absent.
    ///
    /// Returns `true` if the room was created.
    pub fn ensure_room(&mut self, room: &str) -> bool {
        if self.rooms.contains_key(room) {
            return false;
        }

        self.rooms.insert(room.to_string(), Room::default());
        true
    }

    /// Insert or overwrite the member entry for `connection_id`.
    ///
    /// Creates the room if needed and ends any observer status the connection
    /// had there. Returns `true` if the room was created.
    pub fn add_member(
        &mut self,
        room: &str,
        connection_id: &ConnectionId,
        name: impl Into<String>,
        color: Color,
    ) -> bool {
        let created = self.ensure_room(room);

        if let Some(state) = self.rooms.get_mut(room) {
            state.observers.remove(connection_id);
            state.members.insert(connection_id.clone(), Member { name: name.into(), color });
        }

        unindex(&mut self.observing, connection_id, room);
        self.memberships.entry(connection_id.clone()).or_default().insert(room.to_string());

        created
    }

    /// Remove a member. Deletes the room if its member set becomes empty.
    ///
    /// Returns `true` if the room was deleted. Removing a non-member is a
    /// no-op that returns `false`.
    pub fn remove_member(&mut self, room: &str, connection_id: &ConnectionId) -> bool {
        let Some(state) = self.rooms.get_mut(room) else {
            return false;
        };

        if state.members.remove(connection_id).is_none() {
            return false;
        }

        unindex(&mut self.memberships, connection_id, room);

        if state.members.is_empty() {
            self.delete_room(room);
            return true;
        }

        false
    }

    /// Record `connection_id` as an observer of `room`, creating it if needed.
    ///
    /// Members are never downgraded. Returns `true` if the room was created.
    pub fn add_observer(&mut self, room: &str, connection_id: &ConnectionId) -> bool {
        let created = self.ensure_room(room);

        if let Some(state) = self.rooms.get_mut(room) {
            if state.members.contains_key(connection_id) {
                return created;
            }
            state.observers.insert(connection_id.clone());
        }

        self.observing.entry(connection_id.clone()).or_default().insert(room.to_string());
        created
    }

    /// Remove an observer. Deletes the room if nobody is left in it.
    ///
    /// Returns `true` if the room was deleted.
    pub fn remove_observer(&mut self, room: &str, connection_id: &ConnectionId) -> bool {
        let Some(state) = self.rooms.get_mut(room) else {
            return false;
        };

        if !state.observers.remove(connection_id) {
            return false;
        }

        unindex(&mut self.observing, connection_id, room);

        if state.is_abandoned() {
            self.delete_room(room);
            return true;
        }

        false
    }

    /// Remove a connection from every room it is in.
    ///
    /// Memberships are removed first, then observer entries. Rooms emptied on
    /// the way are deleted and reported as such.
    pub fn remove_connection(&mut self, connection_id: &ConnectionId) -> ConnectionRemoval {
        let memberships = self
            .rooms_containing(connection_id)
            .into_iter()
            .map(|room| {
                let deleted = self.remove_member(&room, connection_id);
                RoomExit { room, deleted }
            })
            .collect();

        let observed = self
            .rooms_observed_by(connection_id)
            .into_iter()
            .map(|room| {
                let deleted = self.remove_observer(&room, connection_id);
                RoomExit { room, deleted }
            })
            .collect();

        ConnectionRemoval { memberships, observed }
    }

    /// Color assigned to `connection_id` in `room`. `None` if not a member.
    pub fn member_color(&self, room: &str, connection_id: &ConnectionId) -> Option<&Color> {
        self.rooms.get(room)?.members.get(connection_id).map(|member| &member.color)
    }

    /// Member entry for `connection_id` in `room`.
    pub fn member(&self, room: &str, connection_id: &ConnectionId) -> Option<&Member> {
        self.rooms.get(room)?.members.get(connection_id)
    }

    /// Rooms `connection_id` is a member of, sorted by name.
    pub fn rooms_containing(&self, connection_id: &ConnectionId) -> Vec<String> {
        self.memberships
            .get(connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Rooms `connection_id` observes without being a member, sorted by name.
    pub fn rooms_observed_by(&self, connection_id: &ConnectionId) -> Vec<String> {
        self.observing
            .get(connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Everyone who hears broadcasts in `room`: members, then observers.
    pub fn audience(&self, room: &str) -> impl Iterator<Item = &ConnectionId> + '_ {
        self.rooms
            .get(room)
            .into_iter()
            .flat_map(|state| state.members.keys().chain(state.observers.iter()))
    }

    /// Members of `room`. `None` if the room does not exist.
    pub fn members(
        &self,
        room: &str,
    ) -> Option<impl Iterator<Item = (&ConnectionId, &Member)> + '_> {
        self.rooms.get(room).map(|state| state.members.iter())
    }

    /// Observers of `room`. `None` if the room does not exist.
    pub fn observers(&self, room: &str) -> Option<impl Iterator<Item = &ConnectionId> + '_> {
        self.rooms.get(room).map(|state| state.observers.iter())
    }

    /// Check if a room exists.
    pub fn has_room(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Check if `connection_id` is a member of `room`.
    pub fn is_member(&self, room: &str, connection_id: &ConnectionId) -> bool {
        self.rooms.get(room).is_some_and(|state| state.members.contains_key(connection_id))
    }

    /// Check if `connection_id` observes `room`.
    pub fn is_observer(&self, room: &str, connection_id: &ConnectionId) -> bool {
        self.rooms.get(room).is_some_and(|state| state.observers.contains(connection_id))
    }

    /// Number of members in `room` (0 if it does not exist).
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, |state| state.members.len())
    }

    /// Number of existing rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// All room names, sorted.
    pub fn room_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.rooms.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop a room and every index entry pointing at it.
    fn delete_room(&mut self, room: &str) {
        let Some(state) = self.rooms.remove(room) else {
            return;
        };

        for connection_id in state.members.keys() {
            unindex(&mut self.memberships, connection_id, room);
        }
        for connection_id in &state.observers {
            unindex(&mut self.observing, connection_id, room);
        }
    }
}

/// Remove `room` from a connection's index entry, dropping empty entries.
fn unindex(
    index: &mut HashMap<ConnectionId, BTreeSet<String>>,
    connection_id: &ConnectionId,
    room: &str,
) {
    if let Some(rooms) = index.get_mut(connection_id) {
        rooms.remove(room);
        if rooms.is_empty() {
            index.remove(connection_id);
        }
    }
}

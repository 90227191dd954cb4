//! Standard invariant checks.
//!
//! These invariants capture properties of the registry and directory that
//! must hold after every event, whatever the event sequence.

use super::{Invariant, InvariantResult, SystemSnapshot};

/// Every room has at least one member or one observer.
///
/// Rooms are deleted when their last member leaves, and a created room that
/// nobody joined is deleted when its last observer leaves.
pub struct NoAbandonedRooms;

impl Invariant for NoAbandonedRooms {
    fn name(&self) -> &'static str {
        "NoAbandonedRooms"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (name, room) in &state.rooms {
            if room.members.is_empty() && room.observers.is_empty() {
                return Err(self.violation(format!("room {name} has no members or observers")));
            }
        }
        Ok(())
    }
}

/// Everyone in a room is a registered connection.
///
/// A disconnect must remove the connection from every room before the
/// registry entry goes.
pub struct LiveParticipants;

impl Invariant for LiveParticipants {
    fn name(&self) -> &'static str {
        "LiveParticipants"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (name, room) in &state.rooms {
            let participants = room.members.keys().chain(room.observers.iter());
            for id in participants {
                if !state.connections.contains(id) {
                    return Err(self.violation(format!("room {name} holds dead connection {id}")));
                }
            }
        }
        Ok(())
    }
}

/// Room sets and per-connection indices describe the same relation.
///
/// A connection is a member of R iff R lists it as a member and R appears in
/// its membership index; likewise for observers. Nobody is both member and
/// observer of the same room.
pub struct IndexConsistency;

impl Invariant for IndexConsistency {
    fn name(&self) -> &'static str {
        "IndexConsistency"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (name, room) in &state.rooms {
            for id in room.members.keys() {
                if !state.memberships.get(id).is_some_and(|rooms| rooms.contains(name)) {
                    return Err(self.violation(format!("{id} member of {name} but not indexed")));
                }
                if room.observers.contains(id) {
                    return Err(self.violation(format!("{id} both member and observer of {name}")));
                }
            }
            for id in &room.observers {
                if !state.observing.get(id).is_some_and(|rooms| rooms.contains(name)) {
                    return Err(self.violation(format!("{id} observes {name} but not indexed")));
                }
            }
        }

        for (id, rooms) in &state.memberships {
            for name in rooms {
                if !state.rooms.get(name).is_some_and(|room| room.members.contains_key(id)) {
                    return Err(self.violation(format!("{id} indexed in {name} but not a member")));
                }
            }
        }

        for (id, rooms) in &state.observing {
            for name in rooms {
                if !state.rooms.get(name).is_some_and(|room| room.observers.contains(id)) {
                    return Err(self.violation(format!("{id} indexed observing {name} but absent")));
                }
            }
        }

        Ok(())
    }
}

/// Every assigned color is `#` followed by six lowercase hex digits.
pub struct WellFormedColors;

impl Invariant for WellFormedColors {
    fn name(&self) -> &'static str {
        "WellFormedColors"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (name, room) in &state.rooms {
            for (id, color) in &room.members {
                if !color.is_well_formed() {
                    return Err(self.violation(format!("{id} in {name} has color {color}")));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use huddle_proto::{Color, ConnectionId};

    use super::*;
    use crate::invariants::RoomSnapshot;

    fn id(s: &str) -> ConnectionId {
        ConnectionId::from(s)
    }

    #[test]
    fn abandoned_room_is_flagged() {
        let mut state = SystemSnapshot::empty();
        state.rooms.insert("x".to_string(), RoomSnapshot::default());

        assert!(NoAbandonedRooms.check(&state).is_err());
    }

    #[test]
    fn dead_member_is_flagged() {
        let mut state = SystemSnapshot::empty();
        let mut room = RoomSnapshot::default();
        room.members.insert(id("a"), Color::from_rgb(0x12_34_56));
        state.rooms.insert("x".to_string(), room);

        assert!(LiveParticipants.check(&state).is_err());

        state.connections.insert(id("a"));
        assert!(LiveParticipants.check(&state).is_ok());
    }

    #[test]
    fn missing_index_entry_is_flagged() {
        let mut state = SystemSnapshot::empty();
        let mut room = RoomSnapshot::default();
        room.members.insert(id("a"), Color::from_rgb(1));
        state.rooms.insert("x".to_string(), room);
        state.connections.insert(id("a"));

        assert!(IndexConsistency.check(&state).is_err());

        state.memberships.entry(id("a")).or_default().insert("x".to_string());
        assert!(IndexConsistency.check(&state).is_ok());
    }

    #[test]
    fn generated_colors_pass() {
        let mut state = SystemSnapshot::empty();
        let mut room = RoomSnapshot::default();
        room.members.insert(id("a"), Color::from_rgb(0xff_ff_ff));
        state.rooms.insert("x".to_string(), room);

        assert!(WellFormedColors.check(&state).is_ok());
    }
}

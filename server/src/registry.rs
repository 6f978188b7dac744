//! Room registry: owns every live room, creates rooms on first join, drops
//! them on last leave and routes room-scoped events to them.

use log::{info, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use shared::{ObjectId, ObjectRequest, PhysicsWorld, RigidWorld, RoomId};
use std::collections::HashMap;
use std::time::Instant;

use crate::config::SimulationConfig;
use crate::connection_manager::ConnectionId;
use crate::room::{Room, RoomError, Snapshot};

/// Length of minted room ids.
pub const ROOM_ID_LEN: usize = 6;

/// Mints a short uppercase alphanumeric room token. Collisions are not checked.
pub fn generate_room_id() -> RoomId {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ROOM_ID_LEN)
        .map(|c| char::from(c).to_ascii_uppercase())
        .collect()
}

/// Room-scoped requests other than membership changes.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    CreateObject(ObjectRequest),
    Reset,
}

/// What a dispatched event produced.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    ObjectCreated(ObjectId),
    /// Must be broadcast right away.
    Snapshot(Snapshot),
}

/// Every live room by id. Rooms exist only while they have participants.
pub struct RoomRegistry<W: PhysicsWorld = RigidWorld> {
    rooms: HashMap<RoomId, Room<W>>,
    config: SimulationConfig,
    /// Builds the world for each new room.
    world_factory: fn() -> W,
}

impl RoomRegistry<RigidWorld> {
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_world_factory(config, shared::ground_world)
    }
}

impl<W: PhysicsWorld> RoomRegistry<W> {
    pub fn with_world_factory(config: SimulationConfig, world_factory: fn() -> W) -> Self {
        Self {
            rooms: HashMap::new(),
            config,
            world_factory,
        }
    }

    /// Returns the room for `room_id`, constructing an idle one if needed.
    pub fn resolve_or_create(&mut self, room_id: &str) -> &mut Room<W> {
        let config = self.config;
        let factory = self.world_factory;
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::with_world(room_id, config, factory()))
    }

    /// Adds a participant to the room, creating the room if it is unknown.
    pub fn join(&mut self, room_id: &str, participant: ConnectionId, now: Instant) {
        self.resolve_or_create(room_id)
            .add_participant(participant, now);
    }

    /// Removes a participant; the room is deleted once nobody is left.
    /// Returns whether the room was deleted.
    pub fn leave(&mut self, room_id: &str, participant: ConnectionId) -> Result<bool, RoomError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::UnknownRoom(room_id.to_string()))?;

        room.remove_participant(participant);
        if !room.is_empty() {
            return Ok(false);
        }

        room.stop_scheduler();
        self.rooms.remove(room_id);
        info!("Room {} removed, {} room(s) remaining", room_id, self.rooms.len());
        Ok(true)
    }

    /// Leaves every room the participant is in. Returns the rooms left.
    pub fn disconnect(&mut self, participant: ConnectionId) -> Vec<RoomId> {
        let joined: Vec<RoomId> = self
            .rooms
            .values()
            .filter(|room| room.has_participant(participant))
            .map(|room| room.id().to_string())
            .collect();

        for room_id in &joined {
            if let Err(e) = self.leave(room_id, participant) {
                warn!("Failed to leave {} on disconnect: {}", room_id, e);
            }
        }
        joined
    }

    /// Routes an event to an existing room. Unknown rooms are never created.
    pub fn dispatch(
        &mut self,
        room_id: &str,
        event: RoomEvent,
    ) -> Result<DispatchOutcome, RoomError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::UnknownRoom(room_id.to_string()))?;

        match event {
            RoomEvent::CreateObject(request) => {
                room.create_object(&request).map(DispatchOutcome::ObjectCreated)
            }
            RoomEvent::Reset => Ok(DispatchOutcome::Snapshot(room.reset())),
        }
    }

    /// Earliest pending tick across all rooms.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.rooms.values().filter_map(Room::next_deadline).min()
    }

    /// Runs every tick that is due and collects the snapshots to broadcast.
    pub fn tick_due(&mut self, now: Instant) -> Vec<Snapshot> {
        self.rooms
            .values_mut()
            .filter_map(|room| room.tick(now))
            .collect()
    }

    pub fn get(&self, room_id: &str) -> Option<&Room<W>> {
        self.rooms.get(room_id)
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

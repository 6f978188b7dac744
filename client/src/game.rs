//! Client session state: which room we are in, what to send next, and the
//! reconciler that mirrors the room's objects.

use log::{debug, info, warn};
use shared::{ObjectRequest, Packet, RoomId, Vec3};

use crate::network::NetworkEvent;
use crate::reconciler::Reconciler;
use crate::scene::Scene;

/// Sizes of objects spawned from the keyboard.
pub const SPAWN_SPHERE_RADIUS: f32 = 0.5;
pub const SPAWN_BOX_SIZE: f32 = 1.0;

/// Where the session is in the connect, create, join flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomState {
    /// No server connection.
    Offline,
    /// Connected but not in any room.
    Lobby,
    /// Waiting for the server to mint a room id.
    Creating,
    Joining(RoomId),
    InRoom(RoomId),
}

impl RoomState {
    pub fn room_id(&self) -> Option<&str> {
        match self {
            RoomState::Joining(id) | RoomState::InRoom(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnKind {
    Sphere,
    Box,
}

/// Client-side protocol state machine. Network events go in, outgoing
/// packets come out, and accepted snapshots are passed to the reconciler.
pub struct ClientSession<S: Scene> {
    reconciler: Reconciler<S>,
    room: RoomState,
    /// Room id from the command line, joined on connect.
    requested_room: Option<RoomId>,
    /// Tick of the newest applied state; older ones are ignored.
    last_tick: u64,
    states_received: u64,
}

impl<S: Scene> ClientSession<S> {
    /// `requested_room` is joined on connect; otherwise a new room is created.
    pub fn new(scene: S, requested_room: Option<RoomId>) -> Self {
        Self {
            reconciler: Reconciler::new(scene),
            room: RoomState::Offline,
            requested_room: requested_room.filter(|id| !id.is_empty()),
            last_tick: 0,
            states_received: 0,
        }
    }

    /// Applies a network event and returns the packets to send in response.
    pub fn handle_event(&mut self, event: NetworkEvent) -> Vec<Packet> {
        match event {
            NetworkEvent::Connected => {
                self.room = RoomState::Lobby;
                match self.requested_room.clone() {
                    Some(room_id) => self.join(room_id),
                    None => self.create_room(),
                }
            }
            NetworkEvent::Packet(packet) => self.handle_packet(packet),
            NetworkEvent::Disconnected(reason) => {
                warn!("Disconnected: {}", reason);
                self.room = RoomState::Offline;
                self.reconciler.clear();
                Vec::new()
            }
        }
    }

    pub fn handle_packet(&mut self, packet: Packet) -> Vec<Packet> {
        match packet {
            Packet::RoomCreated { room_id } => {
                if self.room != RoomState::Creating {
                    debug!("Ignoring unrequested room {}", room_id);
                    return Vec::new();
                }
                info!("Room created: {}", room_id);
                self.join(room_id)
            }

            Packet::JoinedRoom { room_id } => {
                if self.room.room_id() == Some(room_id.as_str()) {
                    info!("Joined room {}", room_id);
                    self.room = RoomState::InRoom(room_id);
                }
                Vec::new()
            }

            Packet::PhysicsState {
                room_id,
                tick,
                objects,
            } => {
                if self.room.room_id() != Some(room_id.as_str()) {
                    debug!("Ignoring state for room {}", room_id);
                    return Vec::new();
                }
                self.last_tick = tick;
                self.states_received += 1;
                self.reconciler.reconcile(&objects);
                Vec::new()
            }

            other => {
                warn!("Unexpected packet from server: {:?}", other);
                Vec::new()
            }
        }
    }

    fn join(&mut self, room_id: RoomId) -> Vec<Packet> {
        self.room = RoomState::Joining(room_id.clone());
        vec![Packet::JoinRoom { room_id }]
    }

    fn create_room(&mut self) -> Vec<Packet> {
        self.room = RoomState::Creating;
        vec![Packet::CreateRoom]
    }

    /// Leaves the current room (if any) and asks for a fresh one.
    pub fn request_new_room(&mut self) -> Vec<Packet> {
        if self.room == RoomState::Offline {
            return Vec::new();
        }
        let mut packets: Vec<Packet> = self.leave_room().into_iter().collect();
        packets.extend(self.create_room());
        packets
    }

    pub fn leave_room(&mut self) -> Option<Packet> {
        let room_id = self.room.room_id()?.to_string();
        info!("Leaving room {}", room_id);
        self.room = RoomState::Lobby;
        self.reconciler.clear();
        self.last_tick = 0;
        Some(Packet::LeaveRoom { room_id })
    }

    pub fn spawn(&self, kind: SpawnKind, position: Vec3) -> Option<Packet> {
        let room_id = match &self.room {
            RoomState::InRoom(id) => id.clone(),
            _ => return None,
        };
        let object = match kind {
            SpawnKind::Sphere => ObjectRequest::sphere(SPAWN_SPHERE_RADIUS, position),
            SpawnKind::Box => {
                ObjectRequest::cuboid(SPAWN_BOX_SIZE, SPAWN_BOX_SIZE, SPAWN_BOX_SIZE, position)
            }
        };
        Some(Packet::CreateObject { room_id, object })
    }

    pub fn reset(&self) -> Option<Packet> {
        match &self.room {
            RoomState::InRoom(id) => Some(Packet::ResetScene {
                room_id: id.clone(),
            }),
            _ => None,
        }
    }

    pub fn interpolate(&mut self, dt: f32) {
        self.reconciler.interpolate(dt);
    }

    pub fn room(&self) -> &RoomState {
        &self.room
    }

    pub fn is_connected(&self) -> bool {
        self.room != RoomState::Offline
    }

    pub fn last_tick(&self) -> u64 {
        self.last_tick
    }

    pub fn states_received(&self) -> u64 {
        self.states_received
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }
}

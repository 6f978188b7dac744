//! A simulation room: one physics world, its participants, and the tick
//! scheduler that advances it while anyone is present.

use log::{debug, info, warn};
use shared::{
    BodyDesc, BodyHandle, ObjectId, ObjectRequest, ObjectState, Packet, PhysicsWorld,
    RigidWorld, RoomId, Shape, ShapeError, OBJECT_MASS,
};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use thiserror::Error;

use crate::config::SimulationConfig;
use crate::connection_manager::ConnectionId;
use crate::scheduler::TickScheduler;

/// Physics steps between periodic position traces.
const TRACE_INTERVAL_STEPS: u64 = 60;

/// Why a room-scoped request was refused.
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("room {0} does not exist")]
    UnknownRoom(RoomId),
    #[error("invalid object: {0}")]
    InvalidShape(#[from] ShapeError),
}

/// Immutable state of every tracked object, taken right after a step.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub room_id: RoomId,
    /// Steps taken by the room when the snapshot was built.
    pub tick: u64,
    /// Ordered by object id.
    pub objects: Vec<ObjectState>,
}

impl Snapshot {
    /// Wraps the snapshot as a `PhysicsState` broadcast.
    pub fn into_packet(self) -> Packet {
        Packet::PhysicsState {
            room_id: self.room_id,
            tick: self.tick,
            objects: self.objects,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TrackedObject {
    handle: BodyHandle,
    shape: Shape,
}

/// One isolated simulation with its members and tracked objects.
pub struct Room<W: PhysicsWorld = RigidWorld> {
    id: RoomId,
    participants: HashSet<ConnectionId>,
    world: W,
    /// Objects created by clients; the ground plane is not tracked.
    objects: HashMap<ObjectId, TrackedObject>,
    /// Never reused within the room, even across resets.
    next_object_id: ObjectId,
    scheduler: TickScheduler,
    config: SimulationConfig,
    last_trace_step: u64,
}

impl Room<RigidWorld> {
    pub fn new(id: impl Into<RoomId>, config: SimulationConfig) -> Self {
        Self::with_world(id, config, shared::ground_world())
    }
}

impl<W: PhysicsWorld> Room<W> {
    pub fn with_world(id: impl Into<RoomId>, config: SimulationConfig, world: W) -> Self {
        let id = id.into();
        info!("[Room {}] Created", id);
        Self {
            id,
            participants: HashSet::new(),
            world,
            objects: HashMap::new(),
            next_object_id: 0,
            scheduler: TickScheduler::new(config.tick_interval),
            config,
            last_trace_step: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    /// Adds a participant, starting the simulation for the first one.
    /// Returns false if the participant was already present.
    pub fn add_participant(&mut self, participant: ConnectionId, now: Instant) -> bool {
        if !self.participants.insert(participant) {
            return false;
        }
        info!("[Room {}] Participant {} joined", self.id, participant);
        if self.participants.len() == 1 {
            self.start_scheduler(now);
        }
        true
    }

    /// Removes a participant, stopping the simulation when the room empties.
    pub fn remove_participant(&mut self, participant: ConnectionId) -> bool {
        if !self.participants.remove(&participant) {
            return false;
        }
        info!("[Room {}] Participant {} left", self.id, participant);
        if self.participants.is_empty() {
            self.stop_scheduler();
        }
        true
    }

    pub fn has_participant(&self, participant: ConnectionId) -> bool {
        self.participants.contains(&participant)
    }

    pub fn participants(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.participants.iter().copied()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Validates the request and inserts a dynamic body for it.
    pub fn create_object(&mut self, request: &ObjectRequest) -> Result<ObjectId, RoomError> {
        let shape = Shape::try_from(request)?;

        let id = self.next_object_id;
        self.next_object_id += 1;

        let desc = BodyDesc::dynamic(shape.collider(), OBJECT_MASS, request.position.into())
            .with_user_data(id);
        let handle = self.world.add_body(desc);
        self.objects.insert(id, TrackedObject { handle, shape });

        debug!(
            "[Room {}] Created object {} ({}) at ({:.2}, {:.2}, {:.2})",
            self.id,
            id,
            shape.tag(),
            request.position.x,
            request.position.y,
            request.position.z
        );
        Ok(id)
    }

    /// Removes every object and returns the (empty) snapshot to send right away.
    pub fn reset(&mut self) -> Snapshot {
        info!(
            "[Room {}] Resetting scene, removing {} objects",
            self.id,
            self.objects.len()
        );
        for (_, object) in self.objects.drain() {
            self.world.remove_body(object.handle);
        }
        self.snapshot()
    }

    pub fn start_scheduler(&mut self, now: Instant) {
        if self.scheduler.start(now) {
            info!(
                "[Room {}] Starting simulation at {:.0}Hz",
                self.id,
                1.0 / self.config.fixed_step
            );
        }
    }

    pub fn stop_scheduler(&mut self) {
        if self.scheduler.stop() {
            info!("[Room {}] Simulation stopped", self.id);
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Runs the pending tick if it is due: steps the world and returns a
    /// snapshot, unless the room has no objects.
    pub fn tick(&mut self, now: Instant) -> Option<Snapshot> {
        let tick = self.scheduler.poll(now)?;
        if tick.skipped > 0 {
            warn!(
                "[Room {}] Tick {} ran {} interval(s) late; skipping missed ticks",
                self.id, tick.number, tick.skipped
            );
        }

        self.world.step(
            self.config.fixed_step,
            tick.elapsed.as_secs_f32(),
            self.config.max_substeps,
        );
        self.trace_first_body();

        if self.objects.is_empty() {
            return None;
        }
        Some(self.snapshot())
    }

    /// Current state of all tracked objects in world iteration order.
    pub fn snapshot(&self) -> Snapshot {
        let objects = self
            .world
            .bodies()
            .filter_map(|(handle, body)| {
                let id = body.user_data?;
                let object = self.objects.get(&id)?;
                (object.handle == handle).then(|| ObjectState {
                    id,
                    shape: object.shape,
                    position: body.position.into(),
                    quaternion: body.rotation.into(),
                })
            })
            .collect();

        Snapshot {
            room_id: self.id.clone(),
            tick: self.scheduler.ticks(),
            objects,
        }
    }

    fn trace_first_body(&mut self) {
        let steps = self.world.step_count();
        if steps < self.last_trace_step + TRACE_INTERVAL_STEPS {
            return;
        }
        self.last_trace_step = steps;

        let first = self
            .world
            .bodies()
            .find(|(_, body)| body.user_data.is_some() && body.is_dynamic());
        if let Some((_, body)) = first {
            debug!(
                "[Room {}] Step {} - first body position: ({:.3}, {:.3}, {:.3}), velocity: ({:.3}, {:.3}, {:.3})",
                self.id,
                steps,
                body.position.x,
                body.position.y,
                body.position.z,
                body.linear_velocity.x,
                body.linear_velocity.y,
                body.linear_velocity.z
            );
        }
    }
}

impl<W: PhysicsWorld> Drop for Room<W> {
    fn drop(&mut self) {
        self.scheduler.stop();
        info!("[Room {}] Destroyed", self.id);
    }
}

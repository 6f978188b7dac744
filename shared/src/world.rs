//! Rigid-body world used by both the authoritative rooms and the client's
//! shadow debug world.
//!
//! Rooms and the shadow world only talk to physics through [`PhysicsWorld`].
//! [`RigidWorld`] runs rapier underneath and keeps a [`Body`] record per
//! handle, refreshed after every step, so callers never see rapier types.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use rapier3d::na;
use rapier3d::prelude::{
    BroadPhaseBvh, CCDSolver, ColliderBuilder, ColliderHandle, ColliderSet, ImpulseJointSet,
    IntegrationParameters, IslandManager, MultibodyJointSet, NarrowPhase, PhysicsPipeline,
    RigidBodyBuilder, RigidBodyHandle, RigidBodySet,
};
use std::collections::HashMap;

use crate::LINEAR_DAMPING;

/// Fraction of a step by which accumulated time may fall short and still step.
const STEP_TOLERANCE: f32 = 1e-3;

/// Opaque body identifier, unique for the lifetime of a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(u32);

impl BodyHandle {
    pub fn index(&self) -> u32 {
        self.0
    }
}

/// Collision geometry attached to a body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Collider {
    /// Infinite plane through the body origin; the normal is the body's local +Y.
    Plane,
    Sphere {
        radius: f32,
    },
    Cuboid {
        half_extents: Vector3<f32>,
    },
}

/// Surface tag; each tag maps to the friction and restitution of its colliders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Material {
    Ground,
    Object,
}

/// Friction and restitution of a surface. Two touching surfaces combine by
/// averaging, so two surfaces sharing one `ContactMaterial` reproduce it exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactMaterial {
    pub friction: f32,
    pub restitution: f32,
}

impl Default for ContactMaterial {
    fn default() -> Self {
        Self {
            friction: 0.3,
            restitution: 0.0,
        }
    }
}

/// Everything needed to insert a body into a world.
#[derive(Debug, Clone)]
pub struct BodyDesc {
    pub collider: Collider,
    /// Zero mass makes the body static: `step` never moves it.
    pub mass: f32,
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub material: Material,
    pub user_data: Option<u32>,
}

impl BodyDesc {
    pub fn dynamic(collider: Collider, mass: f32, position: Vector3<f32>) -> Self {
        Self {
            collider,
            mass,
            position,
            rotation: UnitQuaternion::identity(),
            material: Material::Object,
            user_data: None,
        }
    }

    pub fn fixed(collider: Collider, position: Vector3<f32>) -> Self {
        Self {
            collider,
            mass: 0.0,
            position,
            rotation: UnitQuaternion::identity(),
            material: Material::Object,
            user_data: None,
        }
    }

    /// The ground plane at y = 0 every world in this system starts with.
    pub fn ground() -> Self {
        Self {
            material: Material::Ground,
            ..Self::fixed(Collider::Plane, Vector3::zeros())
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_rotation(mut self, rotation: UnitQuaternion<f32>) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_user_data(mut self, user_data: u32) -> Self {
        self.user_data = Some(user_data);
        self
    }
}

/// Last known state of a body, as of the most recent step or pose write.
#[derive(Debug, Clone)]
pub struct Body {
    pub collider: Collider,
    pub mass: f32,
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub linear_velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
    pub material: Material,
    pub user_data: Option<u32>,
    /// Set once the engine has put the body to sleep after coming to rest.
    pub sleeping: bool,
}

impl Body {
    fn from_desc(desc: &BodyDesc) -> Self {
        Self {
            collider: desc.collider,
            mass: desc.mass.max(0.0),
            position: desc.position,
            rotation: desc.rotation,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            material: desc.material,
            user_data: desc.user_data,
            sleeping: false,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.mass > 0.0
    }
}

/// Contract every physics backend exposes to rooms and to the shadow world.
pub trait PhysicsWorld {
    fn add_body(&mut self, desc: BodyDesc) -> BodyHandle;

    fn remove_body(&mut self, handle: BodyHandle) -> Option<Body>;

    /// Advances the world. `elapsed` (measured wall-clock seconds) feeds an
    /// accumulator that is consumed in whole `fixed_dt` steps, at most
    /// `max_substeps` per call. Returns the number of steps taken.
    fn step(&mut self, fixed_dt: f32, elapsed: f32, max_substeps: u32) -> u32;

    /// Bodies in the world's internal iteration order.
    fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> + '_;

    fn body(&self, handle: BodyHandle) -> Option<&Body>;

    /// Overwrites a body's pose without simulating. Returns false for an unknown handle.
    fn set_transform(
        &mut self,
        handle: BodyHandle,
        position: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
    ) -> bool;

    /// Total number of internal fixed steps taken since creation.
    fn step_count(&self) -> u64;

    fn len(&self) -> usize {
        self.bodies().count()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn to_rapier_vector(v: &Vector3<f32>) -> na::Vector3<f32> {
    na::Vector3::new(v.x, v.y, v.z)
}

fn from_rapier_vector(v: &na::Vector3<f32>) -> Vector3<f32> {
    Vector3::new(v.x, v.y, v.z)
}

fn from_rapier_rotation(q: &na::UnitQuaternion<f32>) -> UnitQuaternion<f32> {
    UnitQuaternion::new_unchecked(Quaternion::new(q.w, q.i, q.j, q.k))
}

fn build_collider(collider: &Collider, mass: f32, surface: ContactMaterial) -> ColliderBuilder {
    let builder = match *collider {
        Collider::Plane => ColliderBuilder::halfspace(na::Vector3::y_axis()),
        Collider::Sphere { radius } => ColliderBuilder::ball(radius),
        Collider::Cuboid { half_extents } => {
            ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
        }
    };
    let builder = builder
        .friction(surface.friction)
        .restitution(surface.restitution);
    if mass > 0.0 {
        builder.mass(mass)
    } else {
        builder
    }
}

#[derive(Debug, Clone)]
struct Slot {
    handle: BodyHandle,
    rigid_body: RigidBodyHandle,
    collider: ColliderHandle,
    body: Body,
}

/// Rapier-backed world with a fixed-step accumulator in front of it.
pub struct RigidWorld {
    gravity: Vector3<f32>,
    slots: Vec<Slot>,
    surfaces: HashMap<Material, ContactMaterial>,
    next_handle: u32,
    accumulator: f32,
    step_count: u64,

    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    rigid_bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
}

impl RigidWorld {
    pub fn new(gravity: Vector3<f32>) -> Self {
        Self {
            gravity,
            slots: Vec::new(),
            surfaces: HashMap::new(),
            next_handle: 0,
            accumulator: 0.0,
            step_count: 0,
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
        }
    }

    pub fn gravity(&self) -> Vector3<f32> {
        self.gravity
    }

    /// Sets the surface of a material, including colliders already in the world.
    pub fn set_material(&mut self, material: Material, surface: ContactMaterial) {
        self.surfaces.insert(material, surface);
        for slot in self.slots.iter().filter(|slot| slot.body.material == material) {
            if let Some(collider) = self.colliders.get_mut(slot.collider) {
                collider.set_friction(surface.friction);
                collider.set_restitution(surface.restitution);
            }
        }
    }

    pub fn material(&self, material: Material) -> ContactMaterial {
        self.surfaces.get(&material).copied().unwrap_or_default()
    }

    /// Parameters in effect when bodies of materials `a` and `b` touch.
    pub fn contact_material(&self, a: Material, b: Material) -> ContactMaterial {
        let (a, b) = (self.material(a), self.material(b));
        ContactMaterial {
            friction: (a.friction + b.friction) / 2.0,
            restitution: (a.restitution + b.restitution) / 2.0,
        }
    }

    fn internal_step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.pipeline.step(
            &to_rapier_vector(&self.gravity),
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &(),
            &(),
        );
        self.step_count += 1;
    }

    /// Copies rapier's state into the `Body` records.
    fn refresh_bodies(&mut self) {
        for slot in &mut self.slots {
            let Some(rigid_body) = self.rigid_bodies.get(slot.rigid_body) else {
                continue;
            };
            let body = &mut slot.body;
            body.position = from_rapier_vector(rigid_body.translation());
            body.rotation = from_rapier_rotation(rigid_body.rotation());
            body.linear_velocity = from_rapier_vector(rigid_body.linvel());
            body.angular_velocity = from_rapier_vector(rigid_body.angvel());
            body.sleeping = rigid_body.is_sleeping();
        }
    }
}

impl Default for RigidWorld {
    fn default() -> Self {
        Self::new(Vector3::new(0.0, crate::GRAVITY, 0.0))
    }
}

impl PhysicsWorld for RigidWorld {
    fn add_body(&mut self, desc: BodyDesc) -> BodyHandle {
        let body = Body::from_desc(&desc);
        let builder = if body.is_dynamic() {
            RigidBodyBuilder::dynamic()
                .linear_damping(LINEAR_DAMPING)
                .can_sleep(true)
        } else {
            RigidBodyBuilder::fixed()
        };
        let rigid_body = self.rigid_bodies.insert(
            builder
                .translation(to_rapier_vector(&desc.position))
                .rotation(to_rapier_vector(&desc.rotation.scaled_axis()))
                .build(),
        );

        let surface = self.material(desc.material);
        let collider = self.colliders.insert_with_parent(
            build_collider(&desc.collider, body.mass, surface).build(),
            rigid_body,
            &mut self.rigid_bodies,
        );

        let handle = BodyHandle(self.next_handle);
        self.next_handle += 1;
        self.slots.push(Slot {
            handle,
            rigid_body,
            collider,
            body,
        });
        handle
    }

    fn remove_body(&mut self, handle: BodyHandle) -> Option<Body> {
        let index = self.slots.iter().position(|slot| slot.handle == handle)?;
        let slot = self.slots.remove(index);
        self.rigid_bodies.remove(
            slot.rigid_body,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        Some(slot.body)
    }

    fn step(&mut self, fixed_dt: f32, elapsed: f32, max_substeps: u32) -> u32 {
        if fixed_dt <= 0.0 {
            return 0;
        }

        // Absorbs rounding when the wall-clock tick interval equals the step.
        let tolerance = fixed_dt * STEP_TOLERANCE;

        self.accumulator += elapsed.max(0.0);
        let mut substeps = 0;
        while self.accumulator + tolerance >= fixed_dt && substeps < max_substeps {
            self.internal_step(fixed_dt);
            self.accumulator -= fixed_dt;
            substeps += 1;
        }
        // Time beyond the sub-step cap is dropped rather than carried into later ticks.
        self.accumulator = self.accumulator.max(0.0) % fixed_dt;

        if substeps > 0 {
            self.refresh_bodies();
        }
        substeps
    }

    fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> + '_ {
        self.slots.iter().map(|slot| (slot.handle, &slot.body))
    }

    fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.slots
            .iter()
            .find(|slot| slot.handle == handle)
            .map(|slot| &slot.body)
    }

    fn set_transform(
        &mut self,
        handle: BodyHandle,
        position: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
    ) -> bool {
        let Some(slot) = self.slots.iter_mut().find(|slot| slot.handle == handle) else {
            return false;
        };
        if let Some(rigid_body) = self.rigid_bodies.get_mut(slot.rigid_body) {
            let q = rotation.quaternion();
            rigid_body.set_translation(to_rapier_vector(&position), false);
            rigid_body.set_rotation(
                na::UnitQuaternion::new_unchecked(na::Quaternion::new(q.w, q.i, q.j, q.k)),
                false,
            );
        }
        slot.body.position = position;
        slot.body.rotation = rotation;
        true
    }

    fn step_count(&self) -> u64 {
        self.step_count
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

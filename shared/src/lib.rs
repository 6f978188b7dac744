pub mod protocol;
pub mod shape;
pub mod world;

pub use protocol::{
    encode_frame, read_packet, write_packet, ObjectId, ObjectRequest, ObjectState, Packet,
    ProtocolError, Quat, RoomId, Vec3, MAX_FRAME_LEN,
};
pub use shape::{Shape, ShapeError};
pub use world::{
    Body, BodyDesc, BodyHandle, Collider, ContactMaterial, Material, PhysicsWorld, RigidWorld,
};

/// Simulation rate shared by server rooms and client interpolation (60 Hz).
pub const FIXED_TIME_STEP: f32 = 1.0 / 60.0;
/// Most fixed steps taken for one `step` call; extra time is dropped.
pub const MAX_SUB_STEPS: u32 = 3;
/// Vertical acceleration in m/s².
pub const GRAVITY: f32 = -9.82;
pub const LINEAR_DAMPING: f32 = 0.01;

pub const OBJECT_MASS: f32 = 1.0;
/// Surface used for both the ground and objects.
pub const GROUND_CONTACT: ContactMaterial = ContactMaterial {
    friction: 0.4,
    restitution: 0.3,
};

/// A fresh world with the ground plane and the object/ground contact material,
/// configured identically on server and client.
pub fn ground_world() -> RigidWorld {
    let mut world = RigidWorld::default();
    world.set_material(Material::Ground, GROUND_CONTACT);
    world.set_material(Material::Object, GROUND_CONTACT);
    world.add_body(BodyDesc::ground());
    world
}

//! Shadow debug world: a physics world mirroring server-reported transforms so
//! the wireframe overlay has collision shapes to draw.
//!
//! Bodies here are static and their poses are written directly from the last
//! snapshot. The world is never stepped.

use shared::{BodyDesc, BodyHandle, ObjectId, ObjectState, PhysicsWorld, RigidWorld, Shape};
use std::collections::{BTreeMap, HashMap};

use crate::scene::Transform;

#[derive(Debug, Clone, Copy)]
struct ShadowBody {
    handle: BodyHandle,
    shape: Shape,
}

/// Static mirror of the server's bodies, keyed by object id.
pub struct ShadowWorld<W: PhysicsWorld = RigidWorld> {
    world: W,
    bodies: HashMap<ObjectId, ShadowBody>,
}

impl ShadowWorld<RigidWorld> {
    pub fn new() -> Self {
        Self::with_world(shared::ground_world())
    }
}

impl Default for ShadowWorld<RigidWorld> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: PhysicsWorld> ShadowWorld<W> {
    pub fn with_world(world: W) -> Self {
        Self {
            world,
            bodies: HashMap::new(),
        }
    }

    /// Makes the world hold exactly one body per entry of `store`, posed as
    /// the store says.
    pub fn sync(&mut self, store: &BTreeMap<ObjectId, ObjectState>) {
        let stale: Vec<ObjectId> = self
            .bodies
            .iter()
            .filter(|(id, body)| {
                store
                    .get(id)
                    .map_or(true, |state| state.shape != body.shape)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            self.remove(id);
        }

        for (id, state) in store {
            let transform = Transform::from(state);
            match self.bodies.get(id) {
                Some(body) => {
                    self.world
                        .set_transform(body.handle, transform.position, transform.rotation);
                }
                None => {
                    let desc = BodyDesc::fixed(state.shape.collider(), transform.position)
                        .with_rotation(transform.rotation)
                        .with_user_data(*id);
                    let handle = self.world.add_body(desc);
                    self.bodies.insert(
                        *id,
                        ShadowBody {
                            handle,
                            shape: state.shape,
                        },
                    );
                }
            }
        }
    }

    pub fn clear(&mut self) {
        let ids: Vec<ObjectId> = self.bodies.keys().copied().collect();
        for id in ids {
            self.remove(id);
        }
    }

    fn remove(&mut self, id: ObjectId) {
        if let Some(body) = self.bodies.remove(&id) {
            self.world.remove_body(body.handle);
        }
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.bodies.contains_key(&id)
    }

    /// Number of mirrored objects, not counting the ground plane.
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn world(&self) -> &W {
        &self.world
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{Quat, Vec3};

    fn state(id: ObjectId, y: f32) -> ObjectState {
        ObjectState {
            id,
            shape: Shape::Sphere { radius: 0.5 },
            position: Vec3::new(0.0, y, 0.0),
            quaternion: Quat::default(),
        }
    }

    fn store(states: &[ObjectState]) -> BTreeMap<ObjectId, ObjectState> {
        states.iter().map(|s| (s.id, *s)).collect()
    }

    #[test]
    fn test_sync_adds_static_bodies() {
        let mut shadow = ShadowWorld::new();
        shadow.sync(&store(&[state(1, 5.0), state(2, 3.0)]));

        assert_eq!(shadow.len(), 2);
        // Ground plane plus the two mirrored bodies.
        assert_eq!(shadow.world().len(), 3);
        assert!(shadow.world().bodies().all(|(_, body)| !body.is_dynamic()));
    }

    #[test]
    fn test_sync_force_writes_transforms() {
        let mut shadow = ShadowWorld::new();
        shadow.sync(&store(&[state(1, 5.0)]));
        shadow.sync(&store(&[state(1, 2.5)]));

        let (_, body) = shadow
            .world()
            .bodies()
            .find(|(_, body)| body.user_data == Some(1))
            .unwrap();
        assert_approx_eq!(body.position.y, 2.5);
    }

    #[test]
    fn test_sync_removes_absent_ids() {
        let mut shadow = ShadowWorld::new();
        shadow.sync(&store(&[state(1, 5.0), state(2, 5.0)]));
        shadow.sync(&store(&[state(2, 5.0)]));

        assert!(!shadow.contains(1));
        assert!(shadow.contains(2));
        assert_eq!(shadow.world().len(), 2);
    }

    #[test]
    fn test_shape_change_rebuilds_body() {
        let mut shadow = ShadowWorld::new();
        shadow.sync(&store(&[state(1, 5.0)]));

        let mut boxed = state(1, 5.0);
        boxed.shape = Shape::Box {
            width: 1.0,
            height: 1.0,
            depth: 1.0,
        };
        shadow.sync(&store(&[boxed]));

        assert_eq!(shadow.len(), 1);
        let (_, body) = shadow
            .world()
            .bodies()
            .find(|(_, body)| body.user_data == Some(1))
            .unwrap();
        assert_eq!(body.collider, boxed.shape.collider());
    }

    #[test]
    fn test_shadow_world_is_never_stepped() {
        let mut shadow = ShadowWorld::new();
        for y in [5.0, 4.0, 3.0] {
            shadow.sync(&store(&[state(1, y)]));
        }
        assert_eq!(shadow.world().step_count(), 0);
    }

    #[test]
    fn test_clear_keeps_only_ground() {
        let mut shadow = ShadowWorld::new();
        shadow.sync(&store(&[state(1, 5.0), state(2, 5.0)]));
        shadow.clear();

        assert!(shadow.is_empty());
        assert_eq!(shadow.world().len(), 1);
    }
}

//! Scene abstraction the reconciler drives: anything that can hold one visual
//! per object and move it.

use nalgebra::{UnitQuaternion, Vector3};
use shared::{ObjectId, ObjectState, Shape};

/// Position and orientation of a rendered object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl Transform {
    pub fn new(position: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self { position, rotation }
    }

    /// Blends toward `target`: linear for position, spherical for rotation.
    pub fn blend_toward(&self, target: &Transform, position_t: f32, rotation_t: f32) -> Self {
        let position = self.position.lerp(&target.position, position_t);
        // `try_slerp` gives up when the rotations already coincide within epsilon.
        let rotation = self
            .rotation
            .try_slerp(&target.rotation, rotation_t, 1.0e-6)
            .unwrap_or(target.rotation);
        Self { position, rotation }
    }

    pub fn distance_to(&self, other: &Transform) -> (f32, f32) {
        (
            (self.position - other.position).norm(),
            self.rotation.angle_to(&other.rotation),
        )
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new(Vector3::zeros(), UnitQuaternion::identity())
    }
}

impl From<&ObjectState> for Transform {
    fn from(state: &ObjectState) -> Self {
        Self::new(state.position.into(), state.quaternion.into())
    }
}

/// Rendering backend for object proxies.
pub trait Scene {
    /// Handle owning whatever the backend allocated for one object.
    type Visual;

    fn add_visual(&mut self, id: ObjectId, shape: &Shape, transform: &Transform) -> Self::Visual;

    fn set_transform(&mut self, visual: &mut Self::Visual, transform: &Transform);

    /// Removes the visual and releases everything it owned.
    fn remove_visual(&mut self, visual: Self::Visual);
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{Quat, Vec3};

    #[test]
    fn test_transform_from_state() {
        let state = ObjectState {
            id: 1,
            shape: Shape::Sphere { radius: 0.5 },
            position: Vec3::new(1.0, 2.0, 3.0),
            quaternion: Quat::default(),
        };
        let transform = Transform::from(&state);
        assert_eq!(transform.position, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(transform.rotation, UnitQuaternion::identity());
    }

    #[test]
    fn test_blend_endpoints() {
        let from = Transform::default();
        let to = Transform::new(
            Vector3::new(0.0, 10.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 1.0),
        );

        let same = from.blend_toward(&to, 0.0, 0.0);
        assert_eq!(same.position, from.position);

        let arrived = from.blend_toward(&to, 1.0, 1.0);
        let (linear, angular) = arrived.distance_to(&to);
        assert_approx_eq!(linear, 0.0, 1e-5);
        assert_approx_eq!(angular, 0.0, 1e-4);
    }

    #[test]
    fn test_blend_is_partial() {
        let from = Transform::default();
        let to = Transform::new(
            Vector3::new(0.0, 10.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 1.0),
        );

        let halfway = from.blend_toward(&to, 0.5, 0.5);
        assert_approx_eq!(halfway.position.y, 5.0, 1e-5);
        assert_approx_eq!(halfway.rotation.angle(), 0.5, 1e-4);
    }

    #[test]
    fn test_blend_near_opposite_rotation_is_partial() {
        let from = Transform::default();
        let turned = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 3.0);
        let to = Transform::new(Vector3::zeros(), turned);

        let halfway = from.blend_toward(&to, 0.5, 0.5);
        assert_approx_eq!(halfway.rotation.angle_to(&from.rotation), 1.5, 1e-3);
        assert_approx_eq!(halfway.rotation.angle_to(&turned), 1.5, 1e-3);
    }

    #[test]
    fn test_blend_between_equal_rotations_keeps_them() {
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.7);
        let from = Transform::new(Vector3::zeros(), rotation);
        // Same orientation written in the other hemisphere.
        let flipped = UnitQuaternion::new_unchecked(-rotation.into_inner());
        let to = Transform::new(Vector3::new(1.0, 0.0, 0.0), flipped);

        let blended = from.blend_toward(&to, 0.5, 0.5);
        assert_approx_eq!(blended.rotation.angle_to(&rotation), 0.0, 1e-4);
        assert_approx_eq!(blended.position.x, 0.5, 1e-5);
    }
}

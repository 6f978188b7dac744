//! Object shapes: the closed set of shapes a room can simulate, and the
//! validation that turns a raw creation request into one of them.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::ObjectRequest;
use crate::world::Collider;

/// Shape of a simulated object, carrying only the dimensions its variant needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Sphere { radius: f32 },
    Box { width: f32, height: f32, depth: f32 },
}

impl Shape {
    pub fn tag(&self) -> &'static str {
        match self {
            Shape::Sphere { .. } => "sphere",
            Shape::Box { .. } => "box",
        }
    }

    /// Checks that every dimension is finite and positive.
    pub fn validate(&self) -> Result<(), ShapeError> {
        match *self {
            Shape::Sphere { radius } => dimension("sphere", "radius", Some(radius)).map(drop),
            Shape::Box {
                width,
                height,
                depth,
            } => {
                dimension("box", "width", Some(width))?;
                dimension("box", "height", Some(height))?;
                dimension("box", "depth", Some(depth))?;
                Ok(())
            }
        }
    }

    pub fn collider(&self) -> Collider {
        match *self {
            Shape::Sphere { radius } => Collider::Sphere { radius },
            Shape::Box {
                width,
                height,
                depth,
            } => Collider::Cuboid {
                half_extents: Vector3::new(width / 2.0, height / 2.0, depth / 2.0),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeError {
    #[error("unknown object type: {0}")]
    UnknownType(String),
    #[error("{shape} requires a `{field}` dimension")]
    MissingDimension {
        shape: &'static str,
        field: &'static str,
    },
    #[error("dimension `{field}` must be finite and positive, got {value}")]
    InvalidDimension { field: &'static str, value: f32 },
    #[error("position ({x}, {y}, {z}) is not finite")]
    InvalidPosition { x: f32, y: f32, z: f32 },
}

fn dimension(
    shape: &'static str,
    field: &'static str,
    value: Option<f32>,
) -> Result<f32, ShapeError> {
    let value = value.ok_or(ShapeError::MissingDimension { shape, field })?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ShapeError::InvalidDimension { field, value })
    }
}

impl TryFrom<&ObjectRequest> for Shape {
    type Error = ShapeError;

    fn try_from(request: &ObjectRequest) -> Result<Self, Self::Error> {
        let shape = match request.kind.as_str() {
            "sphere" => Ok(Shape::Sphere {
                radius: dimension("sphere", "radius", request.radius)?,
            }),
            "box" => Ok(Shape::Box {
                width: dimension("box", "width", request.width)?,
                height: dimension("box", "height", request.height)?,
                depth: dimension("box", "depth", request.depth)?,
            }),
            other => Err(ShapeError::UnknownType(other.to_string())),
        }?;

        let position = request.position;
        if !position.is_finite() {
            return Err(ShapeError::InvalidPosition {
                x: position.x,
                y: position.y,
                z: position.z,
            });
        }
        Ok(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Vec3;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_sphere_request_parses() {
        let request = ObjectRequest::sphere(0.5, Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(Shape::try_from(&request), Ok(Shape::Sphere { radius: 0.5 }));
    }

    #[test]
    fn test_box_request_parses() {
        let request = ObjectRequest::cuboid(1.0, 2.0, 3.0, Vec3::default());
        assert_eq!(
            Shape::try_from(&request),
            Ok(Shape::Box {
                width: 1.0,
                height: 2.0,
                depth: 3.0
            })
        );
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let mut request = ObjectRequest::sphere(0.5, Vec3::default());
        request.kind = "cylinder".to_string();
        assert_eq!(
            Shape::try_from(&request),
            Err(ShapeError::UnknownType("cylinder".to_string()))
        );
    }

    #[test]
    fn test_missing_dimension_is_rejected() {
        let mut request = ObjectRequest::cuboid(1.0, 1.0, 1.0, Vec3::default());
        request.depth = None;
        assert_eq!(
            Shape::try_from(&request),
            Err(ShapeError::MissingDimension {
                shape: "box",
                field: "depth"
            })
        );
    }

    #[test]
    fn test_non_positive_dimension_is_rejected() {
        let request = ObjectRequest::sphere(-1.0, Vec3::default());
        assert!(matches!(
            Shape::try_from(&request),
            Err(ShapeError::InvalidDimension { field: "radius", .. })
        ));

        let request = ObjectRequest::sphere(f32::NAN, Vec3::default());
        assert!(Shape::try_from(&request).is_err());
    }

    #[test]
    fn test_non_finite_position_is_rejected() {
        let request = ObjectRequest::sphere(0.5, Vec3::new(f32::NAN, 5.0, 0.0));
        assert!(matches!(
            Shape::try_from(&request),
            Err(ShapeError::InvalidPosition { y, .. }) if y == 5.0
        ));

        let request = ObjectRequest::cuboid(1.0, 1.0, 1.0, Vec3::new(0.0, f32::INFINITY, 0.0));
        assert!(matches!(
            Shape::try_from(&request),
            Err(ShapeError::InvalidPosition { .. })
        ));
    }

    #[test]
    fn test_box_collider_uses_half_extents() {
        let shape = Shape::Box {
            width: 2.0,
            height: 1.0,
            depth: 4.0,
        };
        match shape.collider() {
            Collider::Cuboid { half_extents } => {
                assert_approx_eq!(half_extents.x, 1.0);
                assert_approx_eq!(half_extents.y, 0.5);
                assert_approx_eq!(half_extents.z, 2.0);
            }
            other => panic!("unexpected collider {:?}", other),
        }
    }

    #[test]
    fn test_validate_decoded_shapes() {
        assert!(Shape::Sphere { radius: 0.5 }.validate().is_ok());
        assert!(Shape::Sphere { radius: 0.0 }.validate().is_err());
        assert!(matches!(
            Shape::Box {
                width: 1.0,
                height: f32::INFINITY,
                depth: 1.0
            }
            .validate(),
            Err(ShapeError::InvalidDimension { field: "height", .. })
        ));
    }

    #[test]
    fn test_tags() {
        assert_eq!(Shape::Sphere { radius: 1.0 }.tag(), "sphere");
        assert_eq!(
            Shape::Box {
                width: 1.0,
                height: 1.0,
                depth: 1.0
            }
            .tag(),
            "box"
        );
    }
}

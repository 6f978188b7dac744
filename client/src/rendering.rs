//! Macroquad frontend: the retained proxy scene, the debug overlay of shadow
//! colliders and the HUD. Everything is placed in world space on the CPU, so
//! rotated boxes are built from their transformed corners each frame.

use macroquad::models::{Mesh, Vertex};
use macroquad::prelude::*;
use nalgebra::{UnitQuaternion, Vector3};
use shared::{Collider, ObjectId, PhysicsWorld, Shape};
use std::collections::HashMap;

use crate::scene::{Scene, Transform};
use crate::shadow::ShadowWorld;

const BACKGROUND: Color = Color::new(0.133, 0.133, 0.133, 1.0);
const FLOOR_COLOR: Color = Color::new(0.267, 0.267, 0.267, 1.0);
const SPHERE_COLOR: Color = Color::new(1.0, 0.267, 0.267, 1.0);
const BOX_COLOR: Color = Color::new(0.267, 0.533, 1.0, 1.0);
const WIREFRAME_COLOR: Color = GREEN;
const FLOOR_SIZE: f32 = 20.0;
const CAMERA_DISTANCE: f32 = 13.0;

/// Corner indices of each box face, bit 0 = +x, bit 1 = +y, bit 2 = +z.
const BOX_FACES: [[usize; 4]; 6] = [
    [0, 2, 6, 4],
    [1, 3, 7, 5],
    [0, 1, 5, 4],
    [2, 3, 7, 6],
    [0, 1, 3, 2],
    [4, 5, 7, 6],
];

/// Per-face brightness so the faces of a solid box stay distinguishable.
const FACE_SHADE: [f32; 6] = [0.7, 0.7, 0.55, 1.0, 0.85, 0.85];

fn to_vec3(v: &Vector3<f32>) -> Vec3 {
    vec3(v.x, v.y, v.z)
}

/// World-space corners of a rotated box, indexed like [`BOX_FACES`].
fn box_corners(
    position: &Vector3<f32>,
    rotation: &UnitQuaternion<f32>,
    half_extents: &Vector3<f32>,
) -> [Vec3; 8] {
    std::array::from_fn(|i| {
        let local = Vector3::new(
            if i & 1 != 0 { half_extents.x } else { -half_extents.x },
            if i & 2 != 0 { half_extents.y } else { -half_extents.y },
            if i & 4 != 0 { half_extents.z } else { -half_extents.z },
        );
        to_vec3(&(position + rotation * local))
    })
}

/// The twelve edges of a box as pairs of corners differing in one axis.
fn box_edges() -> impl Iterator<Item = (usize, usize)> {
    (0..8usize).flat_map(|i| {
        [1usize, 2, 4]
            .into_iter()
            .filter(move |bit| i & bit == 0)
            .map(move |bit| (i, i | bit))
    })
}

fn draw_box_wires(corners: &[Vec3; 8], color: Color) {
    for (a, b) in box_edges() {
        draw_line_3d(corners[a], corners[b], color);
    }
}

fn shade(color: Color, factor: f32) -> Color {
    Color::new(color.r * factor, color.g * factor, color.b * factor, color.a)
}

fn box_mesh(corners: &[Vec3; 8], color: Color) -> Mesh {
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (face, shade_factor) in BOX_FACES.iter().zip(FACE_SHADE) {
        let base = vertices.len() as u16;
        let face_color = shade(color, shade_factor);
        for &corner in face {
            let p = corners[corner];
            vertices.push(Vertex::new(p.x, p.y, p.z, 0.0, 0.0, face_color));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    Mesh {
        vertices,
        indices,
        texture: None,
    }
}

/// Handle for one proxy inside a [`MacroquadScene`].
#[derive(Debug, PartialEq, Eq)]
pub struct ProxyHandle(ObjectId);

#[derive(Debug, Clone, Copy)]
struct Proxy {
    shape: Shape,
    color: Color,
    transform: Transform,
}

impl Proxy {
    fn draw(&self) {
        let Transform { position, rotation } = &self.transform;
        match self.shape {
            // A uniform sphere looks the same under any rotation.
            Shape::Sphere { radius } => {
                draw_sphere(to_vec3(position), radius, None, self.color);
            }
            Shape::Box {
                width,
                height,
                depth,
            } => {
                let half_extents = Vector3::new(width, height, depth) / 2.0;
                let corners = box_corners(position, rotation, &half_extents);
                draw_mesh(&box_mesh(&corners, self.color));
                draw_box_wires(&corners, DARKGRAY);
            }
        }
    }
}

/// Retained set of object proxies, drawn each frame.
#[derive(Default)]
pub struct MacroquadScene {
    proxies: HashMap<ObjectId, Proxy>,
}

impl MacroquadScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of proxies currently shown.
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Where the proxy for `id` is drawn, if it exists.
    pub fn transform(&self, id: ObjectId) -> Option<Transform> {
        self.proxies.get(&id).map(|proxy| proxy.transform)
    }

    fn draw(&self) {
        for proxy in self.proxies.values() {
            proxy.draw();
        }
    }
}

/// Fill color for a shape: warm spheres, cool boxes.
pub fn shape_color(shape: &Shape) -> Color {
    match shape {
        Shape::Sphere { .. } => SPHERE_COLOR,
        Shape::Box { .. } => BOX_COLOR,
    }
}

impl Scene for MacroquadScene {
    type Visual = ProxyHandle;

    fn add_visual(&mut self, id: ObjectId, shape: &Shape, transform: &Transform) -> ProxyHandle {
        self.proxies.insert(
            id,
            Proxy {
                shape: *shape,
                color: shape_color(shape),
                transform: *transform,
            },
        );
        ProxyHandle(id)
    }

    fn set_transform(&mut self, visual: &mut ProxyHandle, transform: &Transform) {
        if let Some(proxy) = self.proxies.get_mut(&visual.0) {
            proxy.transform = *transform;
        }
    }

    fn remove_visual(&mut self, visual: ProxyHandle) {
        self.proxies.remove(&visual.0);
    }
}

/// Status shown in the corner of the window.
#[derive(Debug, Clone)]
pub struct Hud {
    /// Whether the server connection is still up.
    pub connected: bool,
    /// Room the client has joined, if any.
    pub room: Option<String>,
    pub object_count: usize,
    /// Tick of the most recent applied state.
    pub last_tick: u64,
}

/// Draws one frame: floor, proxies, spawn gizmo, optional debug overlay and HUD.
pub struct Renderer {
    show_debug: bool,
}

impl Renderer {
    pub fn new(show_debug: bool) -> Self {
        Self { show_debug }
    }

    /// Flips the collider overlay and returns the new setting.
    pub fn toggle_debug(&mut self) -> bool {
        self.show_debug = !self.show_debug;
        self.show_debug
    }

    pub fn show_debug(&self) -> bool {
        self.show_debug
    }

    /// Orbit camera looking at the origin.
    pub fn camera(yaw: f32, pitch: f32) -> Camera3D {
        let position = vec3(
            CAMERA_DISTANCE * pitch.cos() * yaw.cos(),
            CAMERA_DISTANCE * pitch.sin(),
            CAMERA_DISTANCE * pitch.cos() * yaw.sin(),
        );
        Camera3D {
            position,
            target: Vec3::ZERO,
            up: Vec3::Y,
            fovy: 50f32.to_radians(),
            ..Default::default()
        }
    }

    pub fn render(
        &self,
        scene: &MacroquadScene,
        shadow: &ShadowWorld,
        camera: &Camera3D,
        gizmo: Vec3,
        hud: &Hud,
    ) {
        clear_background(BACKGROUND);
        set_camera(camera);

        self.draw_floor();
        scene.draw();
        self.draw_gizmo(gizmo);
        if self.show_debug {
            self.draw_wireframes(shadow);
        }

        set_default_camera();
        self.draw_hud(hud);
    }

    fn draw_floor(&self) {
        draw_plane(Vec3::ZERO, vec2(FLOOR_SIZE / 2.0, FLOOR_SIZE / 2.0), None, FLOOR_COLOR);
        draw_grid(FLOOR_SIZE as u32, 1.0, Color::new(0.4, 0.4, 0.4, 1.0), Color::new(0.2, 0.2, 0.2, 1.0));

        draw_line_3d(Vec3::ZERO, vec3(2.0, 0.0, 0.0), RED);
        draw_line_3d(Vec3::ZERO, vec3(0.0, 2.0, 0.0), GREEN);
        draw_line_3d(Vec3::ZERO, vec3(0.0, 0.0, 2.0), BLUE);
    }

    fn draw_gizmo(&self, gizmo: Vec3) {
        draw_cube_wires(gizmo, vec3(0.3, 0.3, 0.3), YELLOW);
        draw_line_3d(vec3(gizmo.x, 0.0, gizmo.z), gizmo, YELLOW);
    }

    /// Collision shapes of the shadow world, as the server last reported them.
    fn draw_wireframes(&self, shadow: &ShadowWorld) {
        for (_, body) in shadow.world().bodies() {
            match body.collider {
                Collider::Plane => {}
                Collider::Sphere { radius } => {
                    draw_sphere_wires(to_vec3(&body.position), radius, None, WIREFRAME_COLOR);
                }
                Collider::Cuboid { half_extents } => {
                    let corners = box_corners(&body.position, &body.rotation, &half_extents);
                    draw_box_wires(&corners, WIREFRAME_COLOR);
                }
            }
        }
    }

    fn draw_hud(&self, hud: &Hud) {
        let status = if hud.connected { "connected" } else { "disconnected" };
        let room = hud.room.as_deref().unwrap_or("-");
        let lines = [
            format!("{} | room {} | tick {}", status, room, hud.last_tick),
            format!("{} objects | debug {}", hud.object_count, if self.show_debug { "on" } else { "off" }),
            "1 sphere  2 box  R reset  N new room  L leave  G debug".to_string(),
            "arrows/Q/E move spawn point  WASD orbit".to_string(),
        ];

        for (i, line) in lines.iter().enumerate() {
            draw_text(line, 10.0, 20.0 + i as f32 * 18.0, 18.0, WHITE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_scene_tracks_meshes() {
        let mut scene = MacroquadScene::new();
        let shape = Shape::Sphere { radius: 0.5 };
        let mut handle = scene.add_visual(3, &shape, &Transform::default());
        assert_eq!(scene.len(), 1);

        let moved = Transform::new(Vector3::new(0.0, 2.0, 0.0), UnitQuaternion::identity());
        scene.set_transform(&mut handle, &moved);
        assert_eq!(scene.transform(3), Some(moved));

        scene.remove_visual(handle);
        assert!(scene.is_empty());
        assert_eq!(scene.transform(3), None);
    }

    #[test]
    fn test_shapes_have_distinct_colors() {
        let sphere = shape_color(&Shape::Sphere { radius: 1.0 });
        let cube = shape_color(&Shape::Box {
            width: 1.0,
            height: 1.0,
            depth: 1.0,
        });
        assert!(sphere.r > sphere.b);
        assert!(cube.b > cube.r);
    }

    #[test]
    fn test_box_corners_follow_rotation() {
        let position = Vector3::new(1.0, 2.0, 3.0);
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f32::consts::FRAC_PI_2);
        let corners = box_corners(&position, &rotation, &Vector3::new(1.0, 0.5, 0.25));

        // +x+y+z corner: local (1, 0.5, 0.25) turns into (0.25, 0.5, -1).
        let top = corners[7];
        assert_approx_eq!(top.x, 1.25, 1e-5);
        assert_approx_eq!(top.y, 2.5, 1e-5);
        assert_approx_eq!(top.z, 2.0, 1e-5);

        let center = corners.iter().fold(Vec3::ZERO, |sum, c| sum + *c) / 8.0;
        assert_approx_eq!(center.x, 1.0, 1e-5);
        assert_approx_eq!(center.z, 3.0, 1e-5);
    }

    #[test]
    fn test_box_edges_have_extent_lengths() {
        let rotation = UnitQuaternion::from_euler_angles(0.3, 0.7, -0.2);
        let corners = box_corners(&Vector3::zeros(), &rotation, &Vector3::new(1.0, 0.5, 0.25));

        let mut lengths: Vec<f32> = box_edges().map(|(a, b)| corners[a].distance(corners[b])).collect();
        assert_eq!(lengths.len(), 12);
        lengths.sort_by(|a, b| a.total_cmp(b));
        for (group, expected) in lengths.chunks(4).zip([0.5, 1.0, 2.0]) {
            for length in group {
                assert_approx_eq!(*length, expected, 1e-4);
            }
        }
    }

    #[test]
    fn test_box_mesh_covers_six_faces() {
        let corners = box_corners(&Vector3::zeros(), &UnitQuaternion::identity(), &Vector3::repeat(0.5));
        let mesh = box_mesh(&corners, BOX_COLOR);
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }

    #[test]
    fn test_orbit_camera_distance() {
        let camera = Renderer::camera(0.3, 0.4);
        assert_approx_eq!(camera.position.length(), CAMERA_DISTANCE, 1e-3);
    }

    #[test]
    fn test_toggle_debug() {
        let mut renderer = Renderer::new(false);
        assert!(renderer.toggle_debug());
        assert!(renderer.show_debug());
        assert!(!renderer.toggle_debug());
    }
}

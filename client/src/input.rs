//! Keyboard handling with edge detection, spawn gizmo and orbit camera state

use macroquad::prelude::*;

/// Spawn gizmo travel speed in metres per second.
const GIZMO_SPEED: f32 = 4.0;
/// Camera orbit speed in radians per second.
const ORBIT_SPEED: f32 = 1.5;
const GIZMO_LIMIT: f32 = 10.0;
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Raw key states for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    pub spawn_sphere: bool,
    pub spawn_box: bool,
    pub reset: bool,
    pub new_room: bool,
    pub leave: bool,
    pub toggle_debug: bool,
    pub gizmo_left: bool,
    pub gizmo_right: bool,
    pub gizmo_forward: bool,
    pub gizmo_back: bool,
    pub gizmo_up: bool,
    pub gizmo_down: bool,
    pub orbit_left: bool,
    pub orbit_right: bool,
    pub orbit_up: bool,
    pub orbit_down: bool,
}

impl KeyState {
    /// Samples the keyboard through macroquad.
    pub fn sample() -> Self {
        Self {
            spawn_sphere: is_key_down(KeyCode::Key1),
            spawn_box: is_key_down(KeyCode::Key2),
            reset: is_key_down(KeyCode::R),
            new_room: is_key_down(KeyCode::N),
            leave: is_key_down(KeyCode::L),
            toggle_debug: is_key_down(KeyCode::G),
            gizmo_left: is_key_down(KeyCode::Left),
            gizmo_right: is_key_down(KeyCode::Right),
            gizmo_forward: is_key_down(KeyCode::Up),
            gizmo_back: is_key_down(KeyCode::Down),
            gizmo_up: is_key_down(KeyCode::E),
            gizmo_down: is_key_down(KeyCode::Q),
            orbit_left: is_key_down(KeyCode::A),
            orbit_right: is_key_down(KeyCode::D),
            orbit_up: is_key_down(KeyCode::W),
            orbit_down: is_key_down(KeyCode::S),
        }
    }
}

/// One-shot actions triggered this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputActions {
    pub spawn_sphere: bool,
    pub spawn_box: bool,
    pub reset: bool,
    pub new_room: bool,
    pub leave: bool,
    pub toggle_debug: bool,
}

/// Tracks key edges between frames plus the spawn gizmo and camera angles.
pub struct InputManager {
    previous: KeyState,
    /// Where the next object spawns.
    gizmo: Vec3,
    camera_yaw: f32,
    camera_pitch: f32,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            previous: KeyState::default(),
            gizmo: vec3(0.0, 0.5, 0.0),
            camera_yaw: std::f32::consts::FRAC_PI_4,
            camera_pitch: 0.45,
        }
    }

    /// Samples the keyboard and applies it.
    pub fn update(&mut self, dt: f32) -> InputActions {
        self.apply(KeyState::sample(), dt)
    }

    /// Applies one frame of key states: held keys move the gizmo and camera,
    /// newly pressed keys become actions.
    pub fn apply(&mut self, keys: KeyState, dt: f32) -> InputActions {
        let prev = self.previous;
        let actions = InputActions {
            spawn_sphere: keys.spawn_sphere && !prev.spawn_sphere,
            spawn_box: keys.spawn_box && !prev.spawn_box,
            reset: keys.reset && !prev.reset,
            new_room: keys.new_room && !prev.new_room,
            leave: keys.leave && !prev.leave,
            toggle_debug: keys.toggle_debug && !prev.toggle_debug,
        };
        self.previous = keys;

        let axis = |positive: bool, negative: bool| (positive as i8 - negative as i8) as f32;

        let step = GIZMO_SPEED * dt;
        self.gizmo.x += axis(keys.gizmo_right, keys.gizmo_left) * step;
        self.gizmo.z += axis(keys.gizmo_back, keys.gizmo_forward) * step;
        self.gizmo.y += axis(keys.gizmo_up, keys.gizmo_down) * step;
        self.gizmo.x = self.gizmo.x.clamp(-GIZMO_LIMIT, GIZMO_LIMIT);
        self.gizmo.z = self.gizmo.z.clamp(-GIZMO_LIMIT, GIZMO_LIMIT);
        self.gizmo.y = self.gizmo.y.clamp(0.5, GIZMO_LIMIT);

        let orbit = ORBIT_SPEED * dt;
        self.camera_yaw += axis(keys.orbit_right, keys.orbit_left) * orbit;
        self.camera_pitch = (self.camera_pitch + axis(keys.orbit_up, keys.orbit_down) * orbit)
            .clamp(-PITCH_LIMIT, PITCH_LIMIT);

        actions
    }

    /// Where new objects are spawned.
    pub fn gizmo(&self) -> Vec3 {
        self.gizmo
    }

    pub fn camera_yaw(&self) -> f32 {
        self.camera_yaw
    }

    pub fn camera_pitch(&self) -> f32 {
        self.camera_pitch
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

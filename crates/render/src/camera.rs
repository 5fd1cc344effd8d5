//! First-person camera driven by per-frame input.
//!
//! # Invariants
//! - `forward` is unit length and always derived from the current yaw/pitch.
//! - Pitch stays within [-89°, 89°]; yaw is unbounded.
//! - World up is the constant +Y and is never rotated.
//! - The first pointer sample after (re)activation only sets a baseline.

use glam::{Mat4, Vec2, Vec3};
use portal_input::{InputSnapshot, Key, KeySet};
use serde::{Deserialize, Serialize};

pub const WORLD_UP: Vec3 = Vec3::Y;
pub const PITCH_LIMIT: f32 = 89.0;

/// Position and orientation of the fly camera. Angles are in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraState {
    position: Vec3,
    yaw: f32,
    pitch: f32,
    forward: Vec3,
    right: Vec3,
    /// World units per second.
    pub speed: f32,
    /// Degrees per pointer pixel.
    pub sensitivity: f32,
    last_pointer: Option<Vec2>,
}

impl Default for CameraState {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 3.0), -90.0, 0.0)
    }
}

impl CameraState {
    pub fn new(position: Vec3, yaw: f32, pitch: f32) -> Self {
        let mut state = Self {
            position,
            yaw,
            pitch: 0.0,
            forward: Vec3::NEG_Z,
            right: Vec3::X,
            speed: 2.5,
            sensitivity: 0.1,
            last_pointer: None,
        };
        state.set_orientation(yaw, pitch);
        state
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    pub fn right(&self) -> Vec3 {
        self.right
    }

    /// Set yaw and pitch (pitch clamped) and rederive the basis vectors.
    pub fn set_orientation(&mut self, yaw: f32, pitch: f32) {
        self.yaw = yaw;
        self.pitch = pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        let horizontal = pitch.cos();
        let forward = Vec3::new(yaw.cos() * horizontal, pitch.sin(), yaw.sin() * horizontal);
        self.forward = forward.normalize();
        self.right = self.forward.cross(WORLD_UP).normalize();
    }

    /// Apply a pointer delta in pixels. Positive `dy` looks up.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        let yaw = self.yaw + dx * self.sensitivity;
        let pitch = self.pitch + dy * self.sensitivity;
        self.set_orientation(yaw, pitch);
    }

    /// Feed an absolute pointer position. The first sample after construction
    /// or [`reset_pointer_baseline`](Self::reset_pointer_baseline) changes nothing.
    pub fn pointer_moved(&mut self, position: Vec2) {
        if let Some(last) = self.last_pointer.replace(position) {
            // Window y grows downward.
            self.rotate(position.x - last.x, last.y - position.y);
        }
    }

    pub fn reset_pointer_baseline(&mut self) {
        self.last_pointer = None;
    }

    /// Move for `dt` seconds along every held direction. Combined directions
    /// add up, so diagonal motion is faster than axis-aligned motion.
    pub fn apply_movement(&mut self, keys: KeySet, dt: f32) {
        let step = self.speed * dt;
        if keys.contains(Key::Forward) {
            self.position += self.forward * step;
        }
        if keys.contains(Key::Backward) {
            self.position -= self.forward * step;
        }
        if keys.contains(Key::StrafeLeft) {
            self.position -= self.right * step;
        }
        if keys.contains(Key::StrafeRight) {
            self.position += self.right * step;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward, WORLD_UP)
    }
}

/// How the view transform is produced each frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CameraMode {
    /// Scene pushed three units away from a camera at the origin.
    Fixed,
    /// Eye circles the origin in the XZ plane at `rate` radians per second.
    Orbit { radius: f32, rate: f32 },
    /// Keyboard and pointer driven first-person camera.
    #[default]
    Fly,
}

#[derive(Debug, Clone)]
pub struct Camera {
    mode: CameraMode,
    state: CameraState,
}

impl Camera {
    pub fn new(mode: CameraMode, state: CameraState) -> Self {
        Self { mode, state }
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    pub fn state(&self) -> &CameraState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut CameraState {
        &mut self.state
    }

    /// Scroll zoom only applies to the fly camera.
    pub fn accepts_zoom(&self) -> bool {
        self.mode == CameraMode::Fly
    }

    /// Consume one frame of input. Only the fly camera reacts.
    pub fn update(&mut self, input: &InputSnapshot, dt: f32) {
        if self.mode != CameraMode::Fly {
            return;
        }
        if input.pointer_reactivated {
            self.state.reset_pointer_baseline();
        }
        if let Some(pointer) = input.pointer {
            self.state.pointer_moved(pointer);
        }
        self.state.apply_movement(input.keys, dt);
    }

    /// World-to-camera transform. `elapsed` is seconds since the loop started.
    pub fn view_matrix(&self, elapsed: f32) -> Mat4 {
        match self.mode {
            CameraMode::Fixed => Mat4::from_translation(Vec3::new(0.0, 0.0, -3.0)),
            CameraMode::Orbit { radius, rate } => {
                let angle = elapsed * rate;
                let eye = Vec3::new(angle.sin() * radius, 0.0, angle.cos() * radius);
                Mat4::look_at_rh(eye, Vec3::ZERO, WORLD_UP)
            }
            CameraMode::Fly => self.state.view_matrix(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn default_faces_negative_z() {
        let cam = CameraState::default();
        assert!(cam.forward().abs_diff_eq(Vec3::NEG_Z, EPS));
        assert!(cam.right().abs_diff_eq(Vec3::X, EPS));
    }

    #[test]
    fn forward_is_unit_length_across_orientations() {
        let mut cam = CameraState::default();
        let mut yaw = -720.0;
        while yaw <= 720.0 {
            let mut pitch = -89.0;
            while pitch <= 89.0 {
                cam.set_orientation(yaw, pitch);
                let length = cam.forward().length();
                assert!((length - 1.0).abs() <= EPS, "yaw {yaw} pitch {pitch}");
                pitch += 7.5;
            }
            yaw += 13.0;
        }
    }

    #[test]
    fn pitch_pins_at_limits() {
        let mut cam = CameraState::default();
        cam.pointer_moved(Vec2::new(400.0, 300.0));
        // 0.1 degrees per pixel: 2000 pixels upward would be +200 degrees.
        cam.pointer_moved(Vec2::new(400.0, -1700.0));
        assert_eq!(cam.pitch(), 89.0);
        cam.pointer_moved(Vec2::new(400.0, -1800.0));
        assert_eq!(cam.pitch(), 89.0);

        cam.pointer_moved(Vec2::new(400.0, 5000.0));
        assert_eq!(cam.pitch(), -89.0);
        cam.pointer_moved(Vec2::new(400.0, 5100.0));
        assert_eq!(cam.pitch(), -89.0);
    }

    #[test]
    fn first_pointer_sample_sets_baseline_only() {
        let mut cam = CameraState::default();
        let before = (cam.yaw(), cam.pitch());
        cam.pointer_moved(Vec2::new(9_999.0, -4_321.0));
        assert_eq!((cam.yaw(), cam.pitch()), before);

        cam.pointer_moved(Vec2::new(10_009.0, -4_321.0));
        assert!((cam.yaw() - (before.0 + 1.0)).abs() < EPS);

        cam.reset_pointer_baseline();
        let yaw = cam.yaw();
        cam.pointer_moved(Vec2::new(0.0, 0.0));
        assert_eq!(cam.yaw(), yaw);
    }

    #[test]
    fn movement_is_frame_rate_independent() {
        let keys = KeySet::new().with(Key::Forward).with(Key::StrafeRight);
        let mut single = CameraState::default();
        single.set_orientation(-60.0, 20.0);
        let mut split = single.clone();

        single.apply_movement(keys, 1.0);
        for dt in [0.1, 0.25, 0.05, 0.4, 0.2] {
            split.apply_movement(keys, dt);
        }
        assert!(single.position().abs_diff_eq(split.position(), 1e-4));
    }

    #[test]
    fn diagonal_movement_is_not_normalized() {
        let mut cam = CameraState::default();
        let start = cam.position();
        cam.apply_movement(KeySet::new().with(Key::Forward).with(Key::StrafeLeft), 1.0);
        let travelled = (cam.position() - start).length();
        assert!((travelled - 2.5 * 2.0_f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut cam = CameraState::default();
        let start = cam.position();
        cam.apply_movement(KeySet::new().with(Key::Forward).with(Key::Backward), 0.5);
        assert!(cam.position().abs_diff_eq(start, EPS));
    }

    #[test]
    fn view_looks_along_forward() {
        let cam = CameraState::new(Vec3::ZERO, -90.0, 0.0);
        let view = cam.view_matrix();
        let ahead = view.transform_point3(Vec3::new(0.0, 0.0, -1.0));
        assert!(ahead.abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), EPS));
    }

    #[test]
    fn only_fly_mode_consumes_input() {
        let input = InputSnapshot {
            keys: KeySet::new().with(Key::Forward),
            ..InputSnapshot::default()
        };
        let mut fixed = Camera::new(CameraMode::Fixed, CameraState::default());
        fixed.update(&input, 1.0);
        assert_eq!(fixed.state().position(), Vec3::new(0.0, 0.0, 3.0));
        assert!(!fixed.accepts_zoom());

        let mut fly = Camera::new(CameraMode::Fly, CameraState::default());
        fly.update(&input, 1.0);
        let position = fly.state().position();
        assert!(position.abs_diff_eq(Vec3::new(0.0, 0.0, 0.5), EPS));
    }

    #[test]
    fn reactivation_discards_stale_baseline() {
        let mut cam = Camera::new(CameraMode::Fly, CameraState::default());
        let step = |pointer: Vec2, reactivated: bool| InputSnapshot {
            pointer: Some(pointer),
            pointer_reactivated: reactivated,
            ..InputSnapshot::default()
        };
        cam.update(&step(Vec2::new(0.0, 0.0), false), 0.0);
        let yaw = cam.state().yaw();
        cam.update(&step(Vec2::new(500.0, 0.0), true), 0.0);
        assert_eq!(cam.state().yaw(), yaw);
    }

    #[test]
    fn orbit_keeps_its_radius() {
        let mode = CameraMode::Orbit {
            radius: 10.0,
            rate: 1.0,
        };
        let cam = Camera::new(mode, CameraState::default());
        for t in [0.0, 0.7, 2.3] {
            let eye = cam.view_matrix(t).inverse().transform_point3(Vec3::ZERO);
            assert!((eye.length() - 10.0).abs() < 1e-3);
        }
    }

    #[test]
    fn camera_mode_parses_tagged() {
        let yaml = "kind: orbit\nradius: 4.0\nrate: 0.5";
        let mode: CameraMode = serde_yaml::from_str(yaml).unwrap();
        let expected = CameraMode::Orbit {
            radius: 4.0,
            rate: 0.5,
        };
        assert_eq!(mode, expected);
    }
}

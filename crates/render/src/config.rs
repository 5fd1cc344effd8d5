use std::path::{Path, PathBuf};

use glam::Vec3;
use portal_common::{Pose, Viewport};
use serde::{Deserialize, Serialize};

use crate::camera::{CameraMode, CameraState};
use crate::context::MAX_TEXTURE_UNITS;
use crate::error::RenderError;
use crate::mesh::MeshKind;
use crate::texture::SamplerConfig;

/// Everything the loop reads once at startup. Every field has a default, so
/// an empty YAML document describes the stock scene: ten textured cubes and a
/// fly camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub viewport: Viewport,
    pub clear_color: [f32; 4],
    pub depth_test: bool,
    pub mesh: MeshKind,
    pub camera: CameraConfig,
    /// Custom WGSL stages. The built-in stages for `mesh` are used when absent.
    pub shaders: Option<ShaderPaths>,
    pub textures: Vec<TextureConfig>,
    pub drawables: Vec<DrawableConfig>,
    /// Blend factor between the first and second texture.
    pub mix_amount: f32,
    pub tint: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub mode: CameraMode,
    pub position: Vec3,
    pub yaw_degrees: f32,
    pub pitch_degrees: f32,
    pub speed: f32,
    pub sensitivity: f32,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureConfig {
    pub path: PathBuf,
    /// Texture slot in the fragment stage that samples this texture.
    pub uniform: String,
    pub unit: u32,
    #[serde(default = "default_flip")]
    pub flip_vertically: bool,
    #[serde(default, flatten)]
    pub sampler: SamplerConfig,
}

fn default_flip() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawableConfig {
    pub position: Vec3,
    pub angle_degrees: f32,
    pub axis: Vec3,
    /// Degrees per second added to `angle_degrees`.
    pub spin_degrees_per_second: f32,
}

impl Default for DrawableConfig {
    fn default() -> Self {
        let pose = Pose::default();
        Self {
            position: pose.position,
            angle_degrees: pose.angle_degrees,
            axis: pose.axis,
            spin_degrees_per_second: 0.0,
        }
    }
}

impl DrawableConfig {
    pub fn pose_at(&self, elapsed: f32) -> Pose {
        Pose {
            position: self.position,
            angle_degrees: self.angle_degrees + self.spin_degrees_per_second * elapsed,
            axis: self.axis,
        }
    }
}

const CUBE_POSITIONS: [[f32; 3]; 10] = [
    [0.0, 0.0, 0.0],
    [2.0, 5.0, -15.0],
    [-1.5, -2.2, -2.5],
    [-3.8, -2.0, -12.3],
    [2.4, -0.4, -3.5],
    [-1.7, 3.0, -7.5],
    [1.3, -2.0, -2.5],
    [1.5, 2.0, -2.5],
    [1.5, 0.2, -1.5],
    [-1.3, 1.0, -1.5],
];

impl Default for CameraConfig {
    fn default() -> Self {
        let state = CameraState::default();
        Self {
            mode: CameraMode::Fly,
            position: state.position(),
            yaw_degrees: state.yaw(),
            pitch_degrees: state.pitch(),
            speed: state.speed,
            sensitivity: state.sensitivity,
            fov_degrees: 45.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl CameraConfig {
    pub fn initial_state(&self) -> CameraState {
        let mut state = CameraState::new(self.position, self.yaw_degrees, self.pitch_degrees);
        state.speed = self.speed;
        state.sensitivity = self.sensitivity;
        state
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        let drawables = CUBE_POSITIONS
            .iter()
            .enumerate()
            .map(|(i, p)| DrawableConfig {
                position: Vec3::from_array(*p),
                angle_degrees: 20.0 * i as f32,
                spin_degrees_per_second: if i % 3 == 0 { 25.0 } else { 0.0 },
                ..DrawableConfig::default()
            })
            .collect();
        Self {
            viewport: Viewport::default(),
            clear_color: [0.2, 0.3, 0.3, 1.0],
            depth_test: true,
            mesh: MeshKind::Cube,
            camera: CameraConfig::default(),
            shaders: None,
            textures: vec![
                TextureConfig {
                    path: PathBuf::from("assets/textures/container.jpg"),
                    uniform: "texture1".into(),
                    unit: 0,
                    flip_vertically: true,
                    sampler: SamplerConfig::default(),
                },
                TextureConfig {
                    path: PathBuf::from("assets/textures/awesomeface.png"),
                    uniform: "texture2".into(),
                    unit: 1,
                    flip_vertically: true,
                    sampler: SamplerConfig::default(),
                },
            ],
            drawables,
            mix_amount: 0.2,
            tint: [1.0; 4],
        }
    }
}

impl SceneConfig {
    pub fn from_yaml(text: &str) -> Result<Self, RenderError> {
        let parsed = serde_yaml::from_str::<Self>(text);
        let config = parsed.map_err(|e| RenderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RenderError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_yaml(&text)?;
        tracing::info!("loaded scene configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        let fail = |msg: String| Err(RenderError::Config(msg));
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return fail(format!(
                "viewport must be non-empty, got {}x{}",
                self.viewport.width, self.viewport.height
            ));
        }
        let cam = &self.camera;
        if !(cam.fov_degrees > 0.0 && cam.fov_degrees < 180.0) {
            let fov = cam.fov_degrees;
            return fail(format!("field of view {fov}° is outside (0, 180)"));
        }
        if !(cam.near > 0.0 && cam.far > cam.near) {
            let (near, far) = (cam.near, cam.far);
            return fail(format!("clip planes {near}..{far} are not 0 < near < far"));
        }
        if let CameraMode::Orbit { radius, .. } = cam.mode {
            if radius <= 0.0 {
                return fail(format!("orbit radius must be positive, got {radius}"));
            }
        }
        if !(0.0..=1.0).contains(&self.mix_amount) {
            return fail(format!("mix_amount {} is outside [0, 1]", self.mix_amount));
        }
        for texture in &self.textures {
            if texture.unit as usize >= MAX_TEXTURE_UNITS {
                return fail(format!(
                    "texture {} uses unit {}, only {MAX_TEXTURE_UNITS} exist",
                    texture.path.display(),
                    texture.unit
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::WrapMode;

    #[test]
    fn empty_document_is_the_stock_scene() {
        let config = SceneConfig::from_yaml("{}").unwrap();
        assert_eq!(config, SceneConfig::default());
        assert_eq!(config.drawables.len(), 10);
        assert_eq!(config.drawables[3].angle_degrees, 60.0);
        assert_eq!(config.textures[1].unit, 1);
        assert_eq!(config.mix_amount, 0.2);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let yaml = r#"
viewport: { width: 1280, height: 720 }
mesh: quad
camera:
  mode: { kind: fixed }
  fov_degrees: 60.0
textures:
  - path: wall.png
    uniform: texture1
    unit: 0
    wrap: clamp_to_edge
drawables:
  - position: [0.0, 1.0, 0.0]
"#;
        let config = SceneConfig::from_yaml(yaml).unwrap();
        let viewport = Viewport {
            width: 1280,
            height: 720,
        };
        assert_eq!(config.viewport, viewport);
        assert_eq!(config.mesh, MeshKind::Quad);
        assert_eq!(config.camera.mode, CameraMode::Fixed);
        assert_eq!(config.camera.near, 0.1);
        assert_eq!(config.textures.len(), 1);
        assert!(config.textures[0].flip_vertically);
        assert_eq!(config.textures[0].sampler.wrap, WrapMode::ClampToEdge);
        assert_eq!(config.drawables[0].axis, Vec3::new(1.0, 0.3, 0.5));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let invalid = [
            "viewport: { width: 0, height: 10 }",
            "mix_amount: 1.5",
            "camera: { near: 5.0, far: 1.0 }",
            "camera: { mode: { kind: orbit, radius: 0.0, rate: 1.0 } }",
            "textures: [{ path: a.png, uniform: t, unit: 16 }]",
        ];
        for yaml in invalid {
            assert!(SceneConfig::from_yaml(yaml).is_err(), "{yaml}");
        }
        let unknown_mesh = SceneConfig::from_yaml("mesh: sphere");
        assert!(matches!(unknown_mesh, Err(RenderError::Config(_))));
    }

    #[test]
    fn spin_advances_angle_with_time() {
        let drawable = DrawableConfig {
            angle_degrees: 10.0,
            spin_degrees_per_second: 25.0,
            ..DrawableConfig::default()
        };
        assert_eq!(drawable.pose_at(2.0).angle_degrees, 60.0);
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.yaml");
        std::fs::write(&path, "depth_test: false\n").unwrap();
        assert!(!SceneConfig::load(&path).unwrap().depth_test);
        assert!(SceneConfig::load(dir.path().join("missing.yaml")).is_err());
    }
}

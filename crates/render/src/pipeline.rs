//! Model, view and projection transforms, uploaded as three separate
//! column-major uniforms. The shader composes `projection * view * model`.

use glam::{Mat4, Quat, Vec3};
use portal_common::{Pose, Viewport};

use crate::context::RenderContext;
use crate::device::GraphicsDevice;
use crate::shader::ShaderProgram;

pub const MIN_FOV_DEGREES: f32 = 1.0;
pub const MAX_FOV_DEGREES: f32 = 45.0;

/// `translate(position) * rotate(angle, axis)`: the object is rotated about
/// its own origin, then placed in the world. A degenerate axis means no
/// rotation.
pub fn model_matrix(pose: &Pose) -> Mat4 {
    let rotation = match pose.axis.try_normalize() {
        Some(axis) => Quat::from_axis_angle(axis, pose.angle_degrees.to_radians()),
        None => Quat::IDENTITY,
    };
    Mat4::from_translation(pose.position) * Mat4::from_quat(rotation)
}

/// Perspective projection, rebuilt only when the viewport or field of view
/// changes.
#[derive(Debug, Clone)]
pub struct Projection {
    fov_degrees: f32,
    near: f32,
    far: f32,
    viewport: Viewport,
    cached: Option<Mat4>,
}

impl Projection {
    pub fn new(fov_degrees: f32, near: f32, far: f32, viewport: Viewport) -> Self {
        Self {
            fov_degrees,
            near,
            far,
            viewport,
            cached: None,
        }
    }

    pub fn fov_degrees(&self) -> f32 {
        self.fov_degrees
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        if viewport != self.viewport {
            self.viewport = viewport;
            self.cached = None;
        }
    }

    /// Narrow the field of view by `scroll` degrees, staying within
    /// [`MIN_FOV_DEGREES`, `MAX_FOV_DEGREES`].
    pub fn zoom(&mut self, scroll: f32) {
        let fov = (self.fov_degrees - scroll).clamp(MIN_FOV_DEGREES, MAX_FOV_DEGREES);
        if fov != self.fov_degrees {
            self.fov_degrees = fov;
            self.cached = None;
        }
    }

    pub fn matrix(&mut self) -> Mat4 {
        *self.cached.get_or_insert_with(|| {
            tracing::debug!(
                "projection rebuilt: fov {}°, {}x{}",
                self.fov_degrees,
                self.viewport.width,
                self.viewport.height
            );
            Mat4::perspective_rh(
                self.fov_degrees.to_radians(),
                self.viewport.aspect_ratio(),
                self.near,
                self.far,
            )
        })
    }

    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }
}

/// Uniform names the pipeline writes. A program that omits one simply
/// ignores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformNames {
    pub model: String,
    pub view: String,
    pub projection: String,
}

impl Default for UniformNames {
    fn default() -> Self {
        Self {
            model: "model".into(),
            view: "view".into(),
            projection: "projection".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformPipeline {
    names: UniformNames,
    projection: Projection,
}

impl TransformPipeline {
    pub fn new(projection: Projection) -> Self {
        Self {
            names: UniformNames::default(),
            projection,
        }
    }

    pub fn with_names(mut self, names: UniformNames) -> Self {
        self.names = names;
        self
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn projection_mut(&mut self) -> &mut Projection {
        &mut self.projection
    }

    /// Upload the per-frame view and projection.
    pub fn begin_frame<D: GraphicsDevice>(
        &mut self,
        ctx: &mut RenderContext<D>,
        program: &ShaderProgram,
        view: Mat4,
    ) {
        let projection = self.projection.matrix();
        program.set_mat4(ctx, &self.names.view, &view);
        program.set_mat4(ctx, &self.names.projection, &projection);
    }

    /// Upload the model transform for one drawable.
    pub fn upload_model<D: GraphicsDevice>(
        &self,
        ctx: &mut RenderContext<D>,
        program: &ShaderProgram,
        pose: &Pose,
    ) -> Mat4 {
        let model = model_matrix(pose);
        program.set_mat4(ctx, &self.names.model, &model);
        model
    }
}

/// Where a point ends up in view space: `view * model * point`.
pub fn to_view_space(view: Mat4, model: Mat4, point: Vec3) -> Vec3 {
    (view * model).transform_point3(point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraState;
    use crate::device::ClearState;
    use crate::headless::HeadlessDevice;
    use crate::mesh::{Mesh, MeshKind};
    use crate::shaders::{CUBE_VERTEX_SHADER, TEXTURED_FRAGMENT_SHADER};

    #[test]
    fn rotation_applies_before_translation() {
        let pose = Pose {
            position: Vec3::new(5.0, 0.0, 0.0),
            angle_degrees: 90.0,
            axis: Vec3::Y,
        };
        // +X rotated 90° about Y points at -Z, then moves to x = 5.
        let p = model_matrix(&pose).transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(5.0, 0.0, -1.0), 1e-5));
    }

    #[test]
    fn unnormalized_axis_is_normalized() {
        let a = Pose {
            angle_degrees: 30.0,
            axis: Vec3::new(0.0, 4.0, 0.0),
            ..Pose::default()
        };
        let b = Pose { axis: Vec3::Y, ..a };
        assert!(model_matrix(&a).abs_diff_eq(model_matrix(&b), 1e-6));
    }

    #[test]
    fn zero_axis_means_no_rotation() {
        let pose = Pose {
            position: Vec3::ONE,
            angle_degrees: 45.0,
            axis: Vec3::ZERO,
        };
        assert_eq!(model_matrix(&pose), Mat4::from_translation(Vec3::ONE));
    }

    #[test]
    fn point_in_front_of_camera_has_negative_view_z() {
        let camera = CameraState::new(Vec3::ZERO, -90.0, 0.0);
        let pose = Pose {
            position: Vec3::ZERO,
            angle_degrees: 0.0,
            axis: Vec3::Y,
        };
        // Centre of the cube face nearest the camera's line of sight.
        let (view, model) = (camera.view_matrix(), model_matrix(&pose));
        let p = to_view_space(view, model, Vec3::new(0.0, 0.0, -0.5));
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.0, -0.5), 1e-6));
        assert!(p.z < 0.0);
    }

    #[test]
    fn projection_is_cached_until_inputs_change() {
        let mut projection = Projection::new(45.0, 0.1, 100.0, Viewport::default());
        let first = projection.matrix();
        assert!(projection.is_cached());
        projection.set_viewport(Viewport::default());
        assert!(projection.is_cached());

        projection.set_viewport(Viewport {
            width: 1024,
            height: 512,
        });
        assert!(!projection.is_cached());
        assert_ne!(projection.matrix(), first);
    }

    #[test]
    fn zoom_clamps_field_of_view() {
        let mut projection = Projection::new(45.0, 0.1, 100.0, Viewport::default());
        projection.zoom(-10.0);
        assert_eq!(projection.fov_degrees(), 45.0);
        projection.zoom(20.0);
        assert_eq!(projection.fov_degrees(), 25.0);
        projection.zoom(100.0);
        assert_eq!(projection.fov_degrees(), 1.0);
    }

    #[test]
    fn matrices_are_uploaded_separately_and_untransposed() {
        let mut ctx = RenderContext::new(HeadlessDevice::new());
        let (vs, fs) = (CUBE_VERTEX_SHADER, TEXTURED_FRAGMENT_SHADER);
        let program = ShaderProgram::new(&mut ctx, vs, fs).unwrap();
        let mesh = Mesh::preset(&mut ctx, MeshKind::Cube).unwrap();
        let projection = Projection::new(45.0, 0.1, 100.0, Viewport::default());
        let mut pipeline = TransformPipeline::new(projection);
        let camera = CameraState::default();
        let pose = Pose::at(Vec3::new(2.0, 5.0, -15.0));

        ctx.begin_frame(&ClearState::default());
        program.use_program(&mut ctx);
        pipeline.begin_frame(&mut ctx, &program, camera.view_matrix());
        let model = pipeline.upload_model(&mut ctx, &program, &pose);
        mesh.bind(&mut ctx);
        mesh.draw(&mut ctx);

        let draws = ctx.device().draws();
        let draw = draws[0];
        assert_eq!(draw.mat4_at(0, 0, 0), Some(model));
        assert_eq!(draw.mat4_at(0, 0, 64), Some(camera.view_matrix()));
        let projection = pipeline.projection_mut().matrix();
        assert_eq!(draw.mat4_at(0, 0, 128), Some(projection));
        // Translation sits in the last column, i.e. bytes 48..60 of the model.
        let tx: f32 = bytemuck::pod_read_unaligned(&draw.uniforms[0].bytes[48..52]);
        assert_eq!(tx, 2.0);

        mesh.destroy(&mut ctx);
        program.destroy(&mut ctx);
    }
}

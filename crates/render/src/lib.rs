//! Render core: shader programs, meshes, textures, camera and the per-frame
//! transform pipeline, written against a [`GraphicsDevice`] seam.
//!
//! # Invariants
//! - Every GPU resource has exactly one owner and is released exactly once.
//! - Binding state lives in [`RenderContext`]; a draw never reads a binding
//!   that points at a destroyed resource.
//! - Model, view and projection are uploaded separately, column-major.
//! - Single-threaded: input, camera update and draw submission run in
//!   sequence within one frame.
//!
//! [`HeadlessDevice`] records commands instead of touching a GPU; the wgpu
//! backend lives in `portal-render-wgpu`.

pub mod camera;
pub mod clock;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod headless;
pub mod mesh;
pub mod pipeline;
pub mod render_loop;
pub mod scene;
pub mod shader;
pub mod shaders;
pub mod texture;

pub use camera::{Camera, CameraMode, CameraState};
pub use clock::FrameClock;
pub use config::{CameraConfig, DrawableConfig, SceneConfig, ShaderPaths, TextureConfig};
pub use context::{Bindings, RenderContext, ResourceRef, MAX_TEXTURE_UNITS};
pub use device::{BufferUsage, ClearState, DrawCall, DrawRange, GraphicsDevice, VertexArrayDesc};
pub use error::{CompileError, LayoutError, LinkError, RenderError, TextureLoadError};
pub use headless::{DeviceCommand, DrawRecord, HeadlessDevice};
pub use mesh::{Mesh, MeshKind, VertexAttribute, VertexLayout};
pub use pipeline::{Projection, TransformPipeline, UniformNames, model_matrix};
pub use render_loop::{FrameOutcome, FrameSource, RenderLoop, ScriptedSource};
pub use scene::{BoundTexture, Scene};
pub use shader::{LinkedProgram, ProgramInterface, ShaderProgram, StageKind, UniformValue};
pub use texture::{FilterMode, SamplerConfig, Texture, TextureImage, WrapMode};

pub fn crate_info() -> &'static str {
    "portal-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }
}

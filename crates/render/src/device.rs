use portal_common::{BufferId, ProgramId, TextureId, VertexArrayId, Viewport};

use crate::error::RenderError;
use crate::mesh::VertexLayout;
use crate::shader::{LinkedProgram, UniformBuffer};
use crate::texture::{SamplerConfig, TextureImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
}

/// A vertex buffer, optional index buffer and the layout that reads them.
#[derive(Debug, Clone, Copy)]
pub struct VertexArrayDesc<'a> {
    pub vertex_buffer: BufferId,
    pub index_buffer: Option<BufferId>,
    pub layout: &'a VertexLayout,
}

/// Framebuffer clear applied at the start of every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearState {
    pub color: [f32; 4],
    /// Depth testing is enabled and the depth buffer is cleared each frame.
    pub depth: bool,
}

impl Default for ClearState {
    fn default() -> Self {
        Self {
            color: [0.2, 0.3, 0.3, 1.0],
            depth: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawRange {
    /// Non-indexed draw of `count` vertices starting at `first`.
    Arrays { first: u32, count: u32 },
    /// Indexed draw of the first `count` indices.
    Indexed { count: u32 },
}

/// A fully resolved draw: every piece of state the device needs, captured at
/// submission time.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub program: ProgramId,
    pub vertex_array: VertexArrayId,
    pub range: DrawRange,
    /// Uniform contents of the program at submission time.
    pub uniforms: &'a [UniformBuffer],
    /// Texture sampled by each of the program's texture slots, in slot order.
    /// `None` where the slot's unit has no texture bound.
    pub textures: &'a [Option<TextureId>],
}

/// The GPU seam. A backend creates and releases objects under identifiers
/// chosen by the [`RenderContext`](crate::RenderContext) and executes
/// resolved draw calls.
///
/// Identifiers passed to `destroy_*` are always live; the context guarantees
/// each one is released exactly once.
pub trait GraphicsDevice {
    fn create_buffer(
        &mut self,
        id: BufferId,
        usage: BufferUsage,
        contents: &[u8],
    ) -> Result<(), RenderError>;
    fn destroy_buffer(&mut self, id: BufferId);

    fn create_vertex_array(
        &mut self,
        id: VertexArrayId,
        desc: &VertexArrayDesc<'_>,
    ) -> Result<(), RenderError>;
    fn destroy_vertex_array(&mut self, id: VertexArrayId);

    fn create_texture(
        &mut self,
        id: TextureId,
        image: &TextureImage,
        sampler: &SamplerConfig,
    ) -> Result<(), RenderError>;
    fn destroy_texture(&mut self, id: TextureId);

    fn create_program(&mut self, id: ProgramId, program: &LinkedProgram) -> Result<(), RenderError>;
    fn destroy_program(&mut self, id: ProgramId);

    fn resize(&mut self, viewport: Viewport);
    fn begin_frame(&mut self, clear: &ClearState);
    fn draw(&mut self, call: &DrawCall<'_>);
    fn present(&mut self) -> Result<(), RenderError>;
}

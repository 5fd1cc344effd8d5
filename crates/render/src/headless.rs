use std::collections::BTreeSet;
use std::fmt::Write as _;

use portal_common::{BufferId, ProgramId, TextureId, VertexArrayId, Viewport};

use crate::context::ResourceRef;
use crate::device::{BufferUsage, ClearState, DrawCall, DrawRange, GraphicsDevice, VertexArrayDesc};
use crate::error::RenderError;
use crate::shader::{LinkedProgram, UniformBuffer};
use crate::texture::{SamplerConfig, TextureImage};

/// One command received by a [`HeadlessDevice`], in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    CreateBuffer {
        id: BufferId,
        usage: BufferUsage,
        bytes: usize,
    },
    DestroyBuffer(BufferId),
    CreateVertexArray {
        id: VertexArrayId,
        vertex_buffer: BufferId,
        index_buffer: Option<BufferId>,
    },
    DestroyVertexArray(VertexArrayId),
    CreateTexture {
        id: TextureId,
        width: u32,
        height: u32,
    },
    DestroyTexture(TextureId),
    CreateProgram(ProgramId),
    DestroyProgram(ProgramId),
    Resize(Viewport),
    BeginFrame(ClearState),
    Draw(DrawRecord),
    Present,
}

/// Owned copy of a [`DrawCall`].
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: ProgramId,
    pub vertex_array: VertexArrayId,
    pub range: DrawRange,
    pub uniforms: Vec<UniformBuffer>,
    pub textures: Vec<Option<TextureId>>,
}

impl DrawRecord {
    /// Read a column-major 4x4 matrix out of the uniform buffer at
    /// `(group, binding)`, starting at byte `offset`.
    pub fn mat4_at(&self, group: u32, binding: u32, offset: usize) -> Option<glam::Mat4> {
        let buffer = self
            .uniforms
            .iter()
            .find(|u| u.group == group && u.binding == binding)?;
        let bytes = buffer.bytes.get(offset..offset + 64)?;
        let floats: Vec<f32> = bytemuck::pod_collect_to_vec(bytes);
        Some(glam::Mat4::from_cols_slice(&floats))
    }
}

/// A device with no GPU behind it. Records every command so tests and the
/// CLI can inspect exactly what a frame would have done.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    commands: Vec<DeviceCommand>,
    live: BTreeSet<ResourceRef>,
    frame_start: usize,
    frames_presented: u64,
    viewport: Viewport,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Draws recorded since the most recent `begin_frame`.
    pub fn draws(&self) -> Vec<&DrawRecord> {
        self.commands[self.frame_start..]
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::Draw(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Objects created on this device and not yet destroyed.
    pub fn live_objects(&self) -> Vec<ResourceRef> {
        self.live.iter().copied().collect()
    }

    /// Human-readable summary of the current frame.
    pub fn describe_frame(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== frame {} ({}x{}) ===",
            self.frames_presented, self.viewport.width, self.viewport.height
        );
        let _ = writeln!(out, "live objects: {}", self.live.len());
        for draw in self.draws() {
            let textures: Vec<String> = draw
                .textures
                .iter()
                .map(|t| t.map_or_else(|| "-".to_owned(), |id| id.to_string()))
                .collect();
            let _ = writeln!(
                out,
                "  draw {} {} {:?} textures=[{}]",
                draw.program,
                draw.vertex_array,
                draw.range,
                textures.join(", ")
            );
        }
        out
    }

    fn release(&mut self, resource: ResourceRef) {
        if !self.live.remove(&resource) {
            tracing::warn!("headless device asked to release unknown {resource:?}");
        }
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_buffer(
        &mut self,
        id: BufferId,
        usage: BufferUsage,
        contents: &[u8],
    ) -> Result<(), RenderError> {
        self.live.insert(ResourceRef::Buffer(id));
        self.commands.push(DeviceCommand::CreateBuffer {
            id,
            usage,
            bytes: contents.len(),
        });
        Ok(())
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        self.release(ResourceRef::Buffer(id));
        self.commands.push(DeviceCommand::DestroyBuffer(id));
    }

    fn create_vertex_array(
        &mut self,
        id: VertexArrayId,
        desc: &VertexArrayDesc<'_>,
    ) -> Result<(), RenderError> {
        self.live.insert(ResourceRef::VertexArray(id));
        self.commands.push(DeviceCommand::CreateVertexArray {
            id,
            vertex_buffer: desc.vertex_buffer,
            index_buffer: desc.index_buffer,
        });
        Ok(())
    }

    fn destroy_vertex_array(&mut self, id: VertexArrayId) {
        self.release(ResourceRef::VertexArray(id));
        self.commands.push(DeviceCommand::DestroyVertexArray(id));
    }

    fn create_texture(
        &mut self,
        id: TextureId,
        image: &TextureImage,
        _sampler: &SamplerConfig,
    ) -> Result<(), RenderError> {
        self.live.insert(ResourceRef::Texture(id));
        self.commands.push(DeviceCommand::CreateTexture {
            id,
            width: image.width(),
            height: image.height(),
        });
        Ok(())
    }

    fn destroy_texture(&mut self, id: TextureId) {
        self.release(ResourceRef::Texture(id));
        self.commands.push(DeviceCommand::DestroyTexture(id));
    }

    fn create_program(
        &mut self,
        id: ProgramId,
        _program: &LinkedProgram,
    ) -> Result<(), RenderError> {
        self.live.insert(ResourceRef::Program(id));
        self.commands.push(DeviceCommand::CreateProgram(id));
        Ok(())
    }

    fn destroy_program(&mut self, id: ProgramId) {
        self.release(ResourceRef::Program(id));
        self.commands.push(DeviceCommand::DestroyProgram(id));
    }

    fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.commands.push(DeviceCommand::Resize(viewport));
    }

    fn begin_frame(&mut self, clear: &ClearState) {
        self.frame_start = self.commands.len();
        self.commands.push(DeviceCommand::BeginFrame(*clear));
    }

    fn draw(&mut self, call: &DrawCall<'_>) {
        self.commands.push(DeviceCommand::Draw(DrawRecord {
            program: call.program,
            vertex_array: call.vertex_array,
            range: call.range,
            uniforms: call.uniforms.to_vec(),
            textures: call.textures.to_vec(),
        }));
    }

    fn present(&mut self) -> Result<(), RenderError> {
        self.frames_presented += 1;
        self.commands.push(DeviceCommand::Present);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_live_objects() {
        let mut device = HeadlessDevice::new();
        let usage = BufferUsage::Vertex;
        device.create_buffer(BufferId(1), usage, &[0; 12]).unwrap();
        let program = LinkedProgram {
            interface: Default::default(),
            vertex_source: String::new(),
            fragment_source: String::new(),
        };
        device.create_program(ProgramId(2), &program).unwrap();
        assert_eq!(device.live_objects().len(), 2);
        device.destroy_buffer(BufferId(1));
        let program_only = vec![ResourceRef::Program(ProgramId(2))];
        assert_eq!(device.live_objects(), program_only);
    }

    #[test]
    fn draws_are_scoped_to_current_frame() {
        let mut device = HeadlessDevice::new();
        let call = DrawCall {
            program: ProgramId(1),
            vertex_array: VertexArrayId(2),
            range: DrawRange::Indexed { count: 6 },
            uniforms: &[],
            textures: &[],
        };
        device.begin_frame(&ClearState::default());
        device.draw(&call);
        device.draw(&call);
        device.present().unwrap();
        assert_eq!(device.draws().len(), 2);

        device.begin_frame(&ClearState::default());
        device.draw(&call);
        assert_eq!(device.draws().len(), 1);
        assert_eq!(device.frames_presented(), 1);
        assert!(device.describe_frame().contains("Indexed { count: 6 }"));
    }
}

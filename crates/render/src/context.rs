//! Explicit binding state and resource ledger in front of a [`GraphicsDevice`].

use std::collections::BTreeMap;

use portal_common::{BufferId, ProgramId, TextureId, VertexArrayId, Viewport};

use crate::device::{BufferUsage, ClearState, DrawCall, DrawRange, GraphicsDevice, VertexArrayDesc};
use crate::error::RenderError;
use crate::mesh::VertexLayout;
use crate::shader::{LinkedProgram, ProgramInterface, UniformBlock, UniformValue};
use crate::texture::{SamplerConfig, TextureImage};

/// Number of numbered texture units a draw can sample from.
pub const MAX_TEXTURE_UNITS: usize = 16;

/// Any resource tracked by the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceRef {
    Buffer(BufferId),
    VertexArray(VertexArrayId),
    Texture(TextureId),
    Program(ProgramId),
}

/// The "currently bound" slots. Every draw reads these, so they are set
/// explicitly before each draw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    program: Option<ProgramId>,
    vertex_array: Option<VertexArrayId>,
    textures: [Option<TextureId>; MAX_TEXTURE_UNITS],
}

impl Bindings {
    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    pub fn vertex_array(&self) -> Option<VertexArrayId> {
        self.vertex_array
    }

    pub fn texture(&self, unit: u32) -> Option<TextureId> {
        self.textures.get(unit as usize).copied().flatten()
    }

    /// True if any slot still points at `resource`.
    pub fn references(&self, resource: ResourceRef) -> bool {
        match resource {
            ResourceRef::Program(id) => self.program == Some(id),
            ResourceRef::VertexArray(id) => self.vertex_array == Some(id),
            ResourceRef::Texture(id) => self.textures.contains(&Some(id)),
            ResourceRef::Buffer(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BufferInfo {
    usage: BufferUsage,
    bytes: usize,
}

#[derive(Debug, Clone)]
struct VertexArrayState {
    layout: VertexLayout,
    vertex_buffer: BufferId,
    index_buffer: Option<BufferId>,
    vertex_count: u32,
    index_count: Option<u32>,
}

#[derive(Debug, Clone)]
struct ProgramState {
    interface: ProgramInterface,
    uniforms: UniformBlock,
}

/// Report a broken caller contract: a panic in debug builds, an error log
/// (and a skipped operation) in release builds.
fn contract_violation(what: &str) {
    if cfg!(debug_assertions) {
        panic!("render contract violated: {what}");
    }
    tracing::error!("render contract violated: {what}");
}

fn dead_buffer(kind: &str, id: BufferId) -> RenderError {
    RenderError::creation("vertex array", format!("{id} is not a live {kind} buffer"))
}

/// Owns a device, hands out identifiers, tracks which resources are alive and
/// which are bound, and turns binding state into explicit draw calls.
///
/// # Invariants
/// - Every identifier is created once and destroyed at most once.
/// - Destroying a resource clears every binding that referenced it.
/// - A draw is only forwarded to the device with a live program and vertex
///   array bound, within the bounds of the bound buffers.
pub struct RenderContext<D: GraphicsDevice> {
    device: D,
    next_id: u32,
    bindings: Bindings,
    buffers: BTreeMap<BufferId, BufferInfo>,
    vertex_arrays: BTreeMap<VertexArrayId, VertexArrayState>,
    textures: BTreeMap<TextureId, (u32, u32)>,
    programs: BTreeMap<ProgramId, ProgramState>,
    draws_this_frame: u32,
}

impl<D: GraphicsDevice> RenderContext<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            next_id: 0,
            bindings: Bindings::default(),
            buffers: BTreeMap::new(),
            vertex_arrays: BTreeMap::new(),
            textures: BTreeMap::new(),
            programs: BTreeMap::new(),
            draws_this_frame: 0,
        }
    }

    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn draws_this_frame(&self) -> u32 {
        self.draws_this_frame
    }

    // --- buffers -------------------------------------------------------------

    pub fn create_vertex_buffer(&mut self, vertices: &[f32]) -> Result<BufferId, RenderError> {
        self.create_buffer(BufferUsage::Vertex, bytemuck::cast_slice(vertices))
    }

    pub fn create_index_buffer(&mut self, indices: &[u32]) -> Result<BufferId, RenderError> {
        self.create_buffer(BufferUsage::Index, bytemuck::cast_slice(indices))
    }

    fn create_buffer(
        &mut self,
        usage: BufferUsage,
        contents: &[u8],
    ) -> Result<BufferId, RenderError> {
        let id = BufferId(self.allocate_id());
        self.device.create_buffer(id, usage, contents)?;
        self.buffers.insert(
            id,
            BufferInfo {
                usage,
                bytes: contents.len(),
            },
        );
        tracing::debug!("created {id} ({usage:?}, {} bytes)", contents.len());
        Ok(id)
    }

    pub fn destroy_buffer(&mut self, id: BufferId) {
        if self.buffers.remove(&id).is_none() {
            contract_violation(&format!("{id} destroyed twice or never created"));
            return;
        }
        if self
            .vertex_arrays
            .values()
            .any(|va| va.vertex_buffer == id || va.index_buffer == Some(id))
        {
            contract_violation(&format!(
                "{id} destroyed while a vertex array still reads it"
            ));
        }
        self.device.destroy_buffer(id);
        tracing::debug!("destroyed {id}");
    }

    // --- vertex arrays -------------------------------------------------------

    pub fn create_vertex_array(
        &mut self,
        vertex_buffer: BufferId,
        index_buffer: Option<BufferId>,
        layout: &VertexLayout,
    ) -> Result<VertexArrayId, RenderError> {
        layout.validate()?;
        let vertex_info = match self.buffers.get(&vertex_buffer) {
            Some(info) if info.usage == BufferUsage::Vertex => *info,
            _ => return Err(dead_buffer("vertex", vertex_buffer)),
        };
        let index_count = match index_buffer {
            Some(ib) => match self.buffers.get(&ib) {
                Some(info) if info.usage == BufferUsage::Index => Some((info.bytes / 4) as u32),
                _ => return Err(dead_buffer("index", ib)),
            },
            None => None,
        };
        let vertex_count = (vertex_info.bytes / layout.stride as usize) as u32;

        let id = VertexArrayId(self.allocate_id());
        self.device.create_vertex_array(
            id,
            &VertexArrayDesc {
                vertex_buffer,
                index_buffer,
                layout,
            },
        )?;
        self.vertex_arrays.insert(
            id,
            VertexArrayState {
                layout: layout.clone(),
                vertex_buffer,
                index_buffer,
                vertex_count,
                index_count,
            },
        );
        let stride = layout.stride;
        tracing::debug!("created {id} ({vertex_count} vertices, stride {stride})");
        Ok(id)
    }

    pub fn destroy_vertex_array(&mut self, id: VertexArrayId) {
        if self.vertex_arrays.remove(&id).is_none() {
            contract_violation(&format!("{id} destroyed twice or never created"));
            return;
        }
        if self.bindings.vertex_array == Some(id) {
            self.bindings.vertex_array = None;
        }
        self.device.destroy_vertex_array(id);
        tracing::debug!("destroyed {id}");
    }

    pub fn bind_vertex_array(&mut self, id: Option<VertexArrayId>) {
        if let Some(id) = id {
            if !self.vertex_arrays.contains_key(&id) {
                contract_violation(&format!("bind of dead {id}"));
                return;
            }
        }
        self.bindings.vertex_array = id;
    }

    // --- textures ------------------------------------------------------------

    pub fn create_texture(
        &mut self,
        image: &TextureImage,
        sampler: &SamplerConfig,
    ) -> Result<TextureId, RenderError> {
        let id = TextureId(self.allocate_id());
        self.device.create_texture(id, image, sampler)?;
        let (width, height, channels) = (image.width(), image.height(), image.channels());
        self.textures.insert(id, (width, height));
        tracing::debug!("created {id} ({width}x{height}, {channels} channels)");
        Ok(id)
    }

    pub fn destroy_texture(&mut self, id: TextureId) {
        if self.textures.remove(&id).is_none() {
            contract_violation(&format!("{id} destroyed twice or never created"));
            return;
        }
        for slot in self.bindings.textures.iter_mut() {
            if *slot == Some(id) {
                *slot = None;
            }
        }
        self.device.destroy_texture(id);
        tracing::debug!("destroyed {id}");
    }

    /// Bind `texture` to a numbered unit, or clear the unit with `None`.
    pub fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        if unit as usize >= MAX_TEXTURE_UNITS {
            contract_violation(&format!(
                "texture unit {unit} exceeds the {MAX_TEXTURE_UNITS} available"
            ));
            return;
        }
        if let Some(id) = texture {
            if !self.textures.contains_key(&id) {
                contract_violation(&format!("bind of dead {id}"));
                return;
            }
        }
        self.bindings.textures[unit as usize] = texture;
    }

    // --- programs ------------------------------------------------------------

    pub fn create_program(&mut self, program: LinkedProgram) -> Result<ProgramId, RenderError> {
        let id = ProgramId(self.allocate_id());
        self.device.create_program(id, &program)?;
        let uniforms = UniformBlock::new(&program.interface);
        self.programs.insert(
            id,
            ProgramState {
                interface: program.interface,
                uniforms,
            },
        );
        tracing::debug!("created {id}");
        Ok(id)
    }

    pub fn destroy_program(&mut self, id: ProgramId) {
        if self.programs.remove(&id).is_none() {
            contract_violation(&format!("{id} destroyed twice or never created"));
            return;
        }
        if self.bindings.program == Some(id) {
            self.bindings.program = None;
        }
        self.device.destroy_program(id);
        tracing::debug!("destroyed {id}");
    }

    pub fn use_program(&mut self, id: Option<ProgramId>) {
        if let Some(id) = id {
            if !self.programs.contains_key(&id) {
                contract_violation(&format!("use of dead {id}"));
                return;
            }
        }
        self.bindings.program = id;
    }

    /// Set a uniform on `program`. Unknown names are a silent no-op.
    pub fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue) -> bool {
        match self.programs.get_mut(&program) {
            Some(state) => state.uniforms.set(name, value),
            None => {
                contract_violation(&format!("uniform `{name}` set on dead {program}"));
                false
            }
        }
    }

    pub fn program_uniforms(&self, program: ProgramId) -> Option<&UniformBlock> {
        self.programs.get(&program).map(|state| &state.uniforms)
    }

    pub fn program_interface(&self, program: ProgramId) -> Option<&ProgramInterface> {
        self.programs.get(&program).map(|state| &state.interface)
    }

    // --- frame ---------------------------------------------------------------

    pub fn resize(&mut self, viewport: Viewport) {
        tracing::debug!("viewport resized to {}x{}", viewport.width, viewport.height);
        self.device.resize(viewport);
    }

    pub fn begin_frame(&mut self, clear: &ClearState) {
        self.draws_this_frame = 0;
        self.device.begin_frame(clear);
    }

    /// Draw `count` vertices of the bound vertex array starting at `first`.
    pub fn draw_arrays(&mut self, first: u32, count: u32) {
        self.submit(DrawRange::Arrays { first, count });
    }

    /// Draw the first `count` indices of the bound vertex array.
    pub fn draw_indexed(&mut self, count: u32) {
        self.submit(DrawRange::Indexed { count });
    }

    fn submit(&mut self, range: DrawRange) {
        let Some(program_id) = self.bindings.program else {
            contract_violation("draw call with no active program");
            return;
        };
        let Some(va_id) = self.bindings.vertex_array else {
            contract_violation("draw call with no vertex array bound");
            return;
        };
        let program = self.programs.get(&program_id);
        let va = self.vertex_arrays.get(&va_id);
        let (Some(program), Some(va)) = (program, va) else {
            contract_violation("draw call against a destroyed resource");
            return;
        };

        let in_bounds = match range {
            DrawRange::Arrays { first, count } => {
                let end = first.checked_add(count);
                end.is_some_and(|end| end <= va.vertex_count)
            }
            DrawRange::Indexed { count } => va.index_count.is_some_and(|n| count <= n),
        };
        if !in_bounds {
            contract_violation(&format!(
                "{range:?} exceeds {va_id} ({} vertices, {:?} indices)",
                va.vertex_count, va.index_count
            ));
            return;
        }

        for input in &program.interface.vertex_inputs {
            match va.layout.attribute(input.location) {
                Some(attr) if attr.components == input.components => {}
                found => {
                    contract_violation(&format!(
                        "{program_id} reads {} components at location {} but {va_id} provides {:?}",
                        input.components,
                        input.location,
                        found.map(|a| a.components)
                    ));
                    return;
                }
            }
        }

        let textures: Vec<Option<TextureId>> = (0..program.interface.texture_slots.len())
            .map(|slot| {
                program
                    .uniforms
                    .texture_unit(slot)
                    .and_then(|unit| self.bindings.texture(unit))
            })
            .collect();

        let call = DrawCall {
            program: program_id,
            vertex_array: va_id,
            range,
            uniforms: program.uniforms.buffers(),
            textures: &textures,
        };
        self.device.draw(&call);
        self.draws_this_frame += 1;
    }

    pub fn present(&mut self) -> Result<(), RenderError> {
        self.device.present()
    }

    // --- lifecycle -----------------------------------------------------------

    /// Every resource created and not yet destroyed.
    pub fn live_resources(&self) -> Vec<ResourceRef> {
        let buffers = self.buffers.keys().map(|id| ResourceRef::Buffer(*id));
        let arrays = self
            .vertex_arrays
            .keys()
            .map(|id| ResourceRef::VertexArray(*id));
        let textures = self.textures.keys().map(|id| ResourceRef::Texture(*id));
        let programs = self.programs.keys().map(|id| ResourceRef::Program(*id));
        buffers
            .chain(arrays)
            .chain(textures)
            .chain(programs)
            .collect()
    }

    /// Tear down the context and hand back the device. Resources still alive
    /// at this point were leaked by their owners.
    pub fn shutdown(self) -> D {
        let leaked = self.live_resources();
        if leaked.is_empty() {
            tracing::info!("render context shut down cleanly");
        } else {
            for resource in &leaked {
                tracing::warn!("{resource:?} was never destroyed");
            }
        }
        self.device
    }
}

//! Shader programs: compile WGSL stages, link them, and set uniforms by name.
//!
//! Compilation parses and validates each stage with naga, the same front end
//! wgpu uses, so diagnostics are available before any GPU object exists.
//! Linking checks the interface between stages and reflects what the host
//! must supply: vertex attributes, named uniform fields and texture slots.

mod reflect;
mod uniforms;

use std::fmt;
use std::path::Path;

use glam::Mat4;
use portal_common::ProgramId;

use crate::context::RenderContext;
use crate::device::GraphicsDevice;
use crate::error::{CompileError, LinkError, RenderError};
use reflect::{HandleDecl, HandleKind, StageInterface};

pub use reflect::{
    ProgramInterface, TextureSlot, UniformBufferDesc, UniformField, UniformType, VertexInput,
};
pub use uniforms::{UniformBlock, UniformBuffer, UniformValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Vertex,
    Fragment,
}

impl StageKind {
    fn naga_stage(self) -> naga::ShaderStage {
        match self {
            StageKind::Vertex => naga::ShaderStage::Vertex,
            StageKind::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageKind::Vertex => "vertex",
            StageKind::Fragment => "fragment",
        })
    }
}

/// A validated shader stage, ready to link.
#[derive(Debug, Clone)]
pub struct CompiledStage {
    kind: StageKind,
    source: String,
    interface: StageInterface,
}

impl CompiledStage {
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn entry_point(&self) -> &str {
        &self.interface.entry_point
    }
}

/// Two stages linked into one executable interface. The compiled stages can
/// be dropped once this exists.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    pub interface: ProgramInterface,
    pub vertex_source: String,
    pub fragment_source: String,
}

/// Parse and validate `source` as a stage of the given kind.
///
/// Fails with the full diagnostic if the source is not valid WGSL or has no
/// entry point for `kind`.
pub fn compile(source: &str, kind: StageKind) -> Result<CompiledStage, CompileError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| CompileError {
        stage: kind,
        diagnostic: e.emit_to_string(source),
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    );
    validator.validate(&module).map_err(|e| CompileError {
        stage: kind,
        diagnostic: e.emit_to_string(source),
    })?;

    let interface = reflect::reflect_stage(&module, kind.naga_stage()).ok_or_else(|| CompileError {
        stage: kind,
        diagnostic: format!("no @{kind} entry point found"),
    })?;

    tracing::debug!(
        "compiled {kind} stage `{}` ({} inputs, {} uniform bindings)",
        interface.entry_point,
        interface.inputs.len(),
        interface.uniforms.len()
    );

    Ok(CompiledStage {
        kind,
        source: source.to_owned(),
        interface,
    })
}

fn same_slot(a: &HandleDecl, group: u32, binding: u32) -> bool {
    a.group == group && a.binding == binding
}

fn find_handle(
    handles: &[HandleDecl],
    kind: HandleKind,
    group: u32,
    binding: u32,
) -> Option<&HandleDecl> {
    handles
        .iter()
        .find(|h| h.kind == kind && same_slot(h, group, binding))
}

/// Link a vertex and a fragment stage.
///
/// Every fragment input must be written by the vertex stage with the same
/// type, uniform bindings shared by both stages must agree on layout, and
/// each sampler must directly follow a texture in its group.
pub fn link(vertex: &CompiledStage, fragment: &CompiledStage) -> Result<LinkedProgram, LinkError> {
    let mut problems = Vec::new();
    let (vk, fk) = (vertex.kind, fragment.kind);
    if vk != StageKind::Vertex {
        problems.push(format!("expected a vertex stage, got a {vk} stage"));
    }
    if fk != StageKind::Fragment {
        problems.push(format!("expected a fragment stage, got a {fk} stage"));
    }
    if !problems.is_empty() {
        return Err(LinkError {
            diagnostic: problems.join("\n"),
        });
    }

    let vs = &vertex.interface;
    let fs = &fragment.interface;

    for input in &fs.inputs {
        match vs.outputs.iter().find(|out| out.location == input.location) {
            None => problems.push(format!(
                "fragment input `{}` at location {} is not written by the vertex stage",
                input.name, input.location
            )),
            Some(out) if out.ty != input.ty => problems.push(format!(
                "location {}: vertex output `{}` is {:?} but fragment input `{}` is {:?}",
                input.location, out.name, out.ty, input.name, input.ty
            )),
            Some(_) => {}
        }
    }

    let mut uniform_buffers = vs.uniforms.clone();
    for uniform in &fs.uniforms {
        let existing = uniform_buffers
            .iter()
            .find(|u| u.group == uniform.group && u.binding == uniform.binding);
        match existing {
            Some(u) if u.size != uniform.size || u.fields != uniform.fields => {
                let (group, binding) = (uniform.group, uniform.binding);
                problems.push(format!(
                    "`{}` and `{}` at (group {group}, binding {binding}) differ in layout",
                    u.name, uniform.name
                ));
            }
            Some(_) => {}
            None => uniform_buffers.push(uniform.clone()),
        }
    }

    let mut handles: Vec<HandleDecl> = Vec::new();
    for decl in vs.handles.iter().chain(&fs.handles) {
        let (group, binding) = (decl.group, decl.binding);
        match handles.iter().find(|h| same_slot(h, group, binding)) {
            Some(h) if h.kind != decl.kind => problems.push(format!(
                "(group {}, binding {}) is a {:?} in one stage and a {:?} in the other",
                decl.group, decl.binding, h.kind, decl.kind
            )),
            Some(_) => {}
            None => handles.push(decl.clone()),
        }
    }
    for decl in &handles {
        if uniform_buffers
            .iter()
            .any(|u| u.group == decl.group && u.binding == decl.binding)
        {
            problems.push(format!(
                "`{}` shares (group {}, binding {}) with a uniform buffer",
                decl.name, decl.group, decl.binding
            ));
        }
    }

    let mut texture_slots = Vec::new();
    for decl in &handles {
        match decl.kind {
            HandleKind::Texture => {
                let (group, binding) = (decl.group, decl.binding);
                let sampler = find_handle(&handles, HandleKind::Sampler, group, binding + 1);
                texture_slots.push(TextureSlot {
                    name: decl.name.clone(),
                    group,
                    binding,
                    sampler_binding: sampler.map(|h| h.binding),
                });
            }
            HandleKind::Sampler => {
                let texture = match decl.binding.checked_sub(1) {
                    Some(b) => find_handle(&handles, HandleKind::Texture, decl.group, b),
                    None => None,
                };
                if texture.is_none() {
                    problems.push(format!(
                        "sampler `{}` at (group {}, binding {}) does not follow a texture",
                        decl.name, decl.group, decl.binding
                    ));
                }
            }
        }
    }

    if !problems.is_empty() {
        return Err(LinkError {
            diagnostic: problems.join("\n"),
        });
    }

    uniform_buffers.sort_by_key(|u| (u.group, u.binding));
    texture_slots.sort_by_key(|t| (t.group, t.binding));
    let mut vertex_inputs: Vec<VertexInput> = vs
        .inputs
        .iter()
        .map(|input| VertexInput {
            location: input.location,
            components: input.ty.components,
        })
        .collect();
    vertex_inputs.sort_by_key(|input| input.location);

    Ok(LinkedProgram {
        interface: ProgramInterface {
            vertex_entry: vs.entry_point.clone(),
            fragment_entry: fs.entry_point.clone(),
            vertex_inputs,
            uniform_buffers,
            texture_slots,
        },
        vertex_source: vertex.source.clone(),
        fragment_source: fragment.source.clone(),
    })
}

/// Read shader source text from disk. Syntax is not inspected here.
pub fn read_shader_source(path: impl AsRef<Path>) -> Result<String, RenderError> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|source| RenderError::ShaderSource {
        path: path.to_path_buf(),
        source,
    })
}

/// An executable shader program owned by the caller.
///
/// Created once at startup, used every frame, destroyed at shutdown. The
/// handle is not `Clone`; [`ShaderProgram::destroy`] consumes it.
#[derive(Debug)]
pub struct ShaderProgram {
    id: ProgramId,
}

impl ShaderProgram {
    /// Compile both stages, link them and register the program with the device.
    pub fn new<D: GraphicsDevice>(
        ctx: &mut RenderContext<D>,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, RenderError> {
        let vertex = compile(vertex_source, StageKind::Vertex)?;
        let fragment = compile(fragment_source, StageKind::Fragment)?;
        let linked = link(&vertex, &fragment)?;
        let id = ctx.create_program(linked)?;
        Ok(Self { id })
    }

    pub fn from_files<D: GraphicsDevice>(
        ctx: &mut RenderContext<D>,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<Self, RenderError> {
        let vertex_source = read_shader_source(vertex_path)?;
        let fragment_source = read_shader_source(fragment_path)?;
        Self::new(ctx, &vertex_source, &fragment_source)
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// Make this the active program for subsequent draws.
    pub fn use_program<D: GraphicsDevice>(&self, ctx: &mut RenderContext<D>) {
        ctx.use_program(Some(self.id));
    }

    /// Set a uniform by name. A name the program does not declare is a no-op.
    pub fn set_uniform<D: GraphicsDevice>(
        &self,
        ctx: &mut RenderContext<D>,
        name: &str,
        value: UniformValue,
    ) -> bool {
        ctx.set_uniform(self.id, name, value)
    }

    pub fn set_bool<D: GraphicsDevice>(&self, ctx: &mut RenderContext<D>, name: &str, value: bool) {
        self.set_uniform(ctx, name, UniformValue::Bool(value));
    }

    pub fn set_int<D: GraphicsDevice>(&self, ctx: &mut RenderContext<D>, name: &str, value: i32) {
        self.set_uniform(ctx, name, UniformValue::Int(value));
    }

    pub fn set_float<D: GraphicsDevice>(&self, ctx: &mut RenderContext<D>, name: &str, value: f32) {
        self.set_uniform(ctx, name, UniformValue::Float(value));
    }

    pub fn set_mat4<D: GraphicsDevice>(
        &self,
        ctx: &mut RenderContext<D>,
        name: &str,
        value: &Mat4,
    ) {
        self.set_uniform(ctx, name, UniformValue::Mat4(*value));
    }

    pub fn uniform<D: GraphicsDevice>(
        &self,
        ctx: &RenderContext<D>,
        name: &str,
    ) -> Option<UniformValue> {
        ctx.program_uniforms(self.id)?.get(name)
    }

    pub fn interface<'a, D: GraphicsDevice>(
        &self,
        ctx: &'a RenderContext<D>,
    ) -> Option<&'a ProgramInterface> {
        ctx.program_interface(self.id)
    }

    pub fn destroy<D: GraphicsDevice>(self, ctx: &mut RenderContext<D>) {
        ctx.destroy_program(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaders;

    const MINIMAL_VS: &str = r#"
@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 1.0);
}
"#;

    const MINIMAL_FS: &str = r#"
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.5, 0.2, 1.0);
}
"#;

    #[test]
    fn builtin_stages_compile() {
        let vs = compile(shaders::CUBE_VERTEX_SHADER, StageKind::Vertex).unwrap();
        assert_eq!(vs.kind(), StageKind::Vertex);
        assert_eq!(vs.entry_point(), "vs_main");
        let fs = compile(shaders::TEXTURED_FRAGMENT_SHADER, StageKind::Fragment).unwrap();
        assert_eq!(fs.entry_point(), "fs_main");
    }

    #[test]
    fn syntax_error_reports_diagnostic() {
        let err = compile("@vertex fn vs_main( -> {", StageKind::Vertex).unwrap_err();
        assert_eq!(err.stage, StageKind::Vertex);
        assert!(!err.diagnostic.is_empty());
        assert!(err.to_string().contains("vertex shader compilation failed"));
    }

    #[test]
    fn semantic_error_reports_diagnostic() {
        let source = r#"
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return undefined_value;
}
"#;
        let err = compile(source, StageKind::Fragment).unwrap_err();
        assert!(err.diagnostic.contains("undefined_value"));
    }

    #[test]
    fn wrong_stage_kind_is_a_compile_error() {
        let err = compile(MINIMAL_FS, StageKind::Vertex).unwrap_err();
        assert!(err.diagnostic.contains("@vertex"));
    }

    #[test]
    fn link_reflects_interface() {
        let vs = compile(shaders::CUBE_VERTEX_SHADER, StageKind::Vertex).unwrap();
        let fs = compile(shaders::TEXTURED_FRAGMENT_SHADER, StageKind::Fragment).unwrap();
        let program = link(&vs, &fs).unwrap();
        let interface = &program.interface;

        let inputs: Vec<_> = interface
            .vertex_inputs
            .iter()
            .map(|i| (i.location, i.components))
            .collect();
        assert_eq!(inputs, [(0, 3), (1, 2)]);
        let names: Vec<_> = interface.uniform_buffers[0]
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, ["model", "view", "projection"]);
        assert_eq!(interface.uniform_buffers[0].size, 192);
        assert_eq!(interface.uniform_buffers[0].fields[1].offset, 64);

        let slots: Vec<_> = interface
            .texture_slots
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(slots, ["texture1", "texture2"]);
        assert_eq!(interface.texture_slots[0].sampler_binding, Some(1));
        assert_eq!(interface.group_count(), 2);
    }

    #[test]
    fn minimal_program_links_without_resources() {
        let vs = compile(MINIMAL_VS, StageKind::Vertex).unwrap();
        let fs = compile(MINIMAL_FS, StageKind::Fragment).unwrap();
        let program = link(&vs, &fs).unwrap();
        assert!(program.interface.uniform_buffers.is_empty());
        assert_eq!(program.interface.group_count(), 0);
    }

    #[test]
    fn missing_varying_fails_link() {
        let vs = compile(MINIMAL_VS, StageKind::Vertex).unwrap();
        let fs = compile(shaders::TEXTURED_FRAGMENT_SHADER, StageKind::Fragment).unwrap();
        let err = link(&vs, &fs).unwrap_err();
        assert!(err.diagnostic.contains("location 0"));
    }

    #[test]
    fn varying_type_mismatch_fails_link() {
        let vs = compile(
            r#"
struct Out {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec3<f32>,
};
@vertex
fn vs_main(@location(0) position: vec3<f32>) -> Out {
    var out: Out;
    out.clip = vec4<f32>(position, 1.0);
    out.uv = position;
    return out;
}
"#,
            StageKind::Vertex,
        )
        .unwrap();
        let fs = compile(
            r#"
@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(uv, 0.0, 1.0);
}
"#,
            StageKind::Fragment,
        )
        .unwrap();
        let err = link(&vs, &fs).unwrap_err();
        assert!(err.diagnostic.contains("location 0"));
    }

    #[test]
    fn conflicting_uniform_layouts_fail_link() {
        let vs = compile(
            r#"
struct Params { scale: vec4<f32> };
@group(0) @binding(0) var<uniform> params: Params;
@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position * params.scale.x, 1.0);
}
"#,
            StageKind::Vertex,
        )
        .unwrap();
        let fs = compile(
            r#"
struct Params { color: vec4<f32> };
@group(0) @binding(0) var<uniform> params: Params;
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return params.color;
}
"#,
            StageKind::Fragment,
        )
        .unwrap();
        let err = link(&vs, &fs).unwrap_err();
        assert!(err.diagnostic.contains("differ in layout"));
    }

    #[test]
    fn stages_passed_in_wrong_order_fail_link() {
        let vs = compile(MINIMAL_VS, StageKind::Vertex).unwrap();
        let fs = compile(MINIMAL_FS, StageKind::Fragment).unwrap();
        assert!(link(&fs, &vs).is_err());
    }

    #[test]
    fn shader_source_read_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.wgsl");
        let err = read_shader_source(&missing).unwrap_err();
        assert!(matches!(err, RenderError::ShaderSource { .. }));

        let present = dir.path().join("vertex.wgsl");
        std::fs::write(&present, MINIMAL_VS).unwrap();
        assert_eq!(read_shader_source(&present).unwrap(), MINIMAL_VS);
    }
}

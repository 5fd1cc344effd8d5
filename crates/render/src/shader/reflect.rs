//! Interface reflection over a validated naga module.

use naga::{
    AddressSpace, Binding, Handle, Module, Scalar, ScalarKind, ShaderStage, Type, TypeInner,
    VectorSize,
};

/// Type of a named uniform field, as seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Int,
    UInt,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    /// Present in the shader but not settable from the host (arrays, nested structs, mat3...).
    Opaque,
}

impl UniformType {
    /// Bytes written by a host-side set.
    pub fn byte_size(self) -> usize {
        match self {
            UniformType::Float | UniformType::Int | UniformType::UInt => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 => 12,
            UniformType::Vec4 => 16,
            UniformType::Mat4 => 64,
            UniformType::Opaque => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformField {
    pub name: String,
    pub offset: u32,
    pub ty: UniformType,
}

/// One `var<uniform>` binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBufferDesc {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub size: u32,
    pub fields: Vec<UniformField>,
}

/// A sampled texture, optionally paired with the sampler at the next binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSlot {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub sampler_binding: Option<u32>,
}

/// A vertex attribute read by the vertex stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexInput {
    pub location: u32,
    pub components: u32,
}

/// Reflected interface of a linked program: what the host must feed it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramInterface {
    pub vertex_entry: String,
    pub fragment_entry: String,
    /// Attributes read by the vertex stage, ordered by location.
    pub vertex_inputs: Vec<VertexInput>,
    /// Uniform bindings of both stages, ordered by (group, binding).
    pub uniform_buffers: Vec<UniformBufferDesc>,
    /// Sampled textures of both stages, ordered by (group, binding).
    pub texture_slots: Vec<TextureSlot>,
}

impl ProgramInterface {
    /// Number of bind groups the program addresses (highest group + 1).
    pub fn group_count(&self) -> u32 {
        let uniform_groups = self.uniform_buffers.iter().map(|u| u.group + 1);
        let texture_groups = self.texture_slots.iter().map(|t| t.group + 1);
        uniform_groups.chain(texture_groups).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScalarClass {
    Float,
    Sint,
    Uint,
    Other,
}

/// Type of a user-defined stage input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VaryingType {
    pub scalar: ScalarClass,
    pub components: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Varying {
    pub name: String,
    pub location: u32,
    pub ty: VaryingType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandleKind {
    Texture,
    Sampler,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HandleDecl {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub kind: HandleKind,
}

/// Everything link needs to know about one compiled stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StageInterface {
    pub entry_point: String,
    pub inputs: Vec<Varying>,
    pub outputs: Vec<Varying>,
    pub uniforms: Vec<UniformBufferDesc>,
    pub handles: Vec<HandleDecl>,
}

/// Reflect the first entry point of `stage` in `module`. `None` if the module
/// has no such entry point.
pub(crate) fn reflect_stage(module: &Module, stage: ShaderStage) -> Option<StageInterface> {
    let entry = module.entry_points.iter().find(|ep| ep.stage == stage)?;

    let mut inputs = Vec::new();
    for arg in &entry.function.arguments {
        let name = arg.name.clone().unwrap_or_default();
        collect_varyings(module, &name, arg.ty, arg.binding.as_ref(), &mut inputs);
    }
    let mut outputs = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_varyings(module, "", result.ty, result.binding.as_ref(), &mut outputs);
    }

    let mut uniforms = Vec::new();
    let mut handles = Vec::new();
    for (_, global) in module.global_variables.iter() {
        let Some(binding) = &global.binding else {
            continue;
        };
        let name = global.name.clone().unwrap_or_default();
        match global.space {
            AddressSpace::Uniform => {
                let (group, slot) = (binding.group, binding.binding);
                uniforms.push(reflect_uniform(module, name, group, slot, global.ty));
            }
            AddressSpace::Handle => {
                let kind = match module.types[global.ty].inner {
                    TypeInner::Image { .. } => HandleKind::Texture,
                    TypeInner::Sampler { .. } => HandleKind::Sampler,
                    _ => continue,
                };
                handles.push(HandleDecl {
                    name,
                    group: binding.group,
                    binding: binding.binding,
                    kind,
                });
            }
            _ => {}
        }
    }

    Some(StageInterface {
        entry_point: entry.name.clone(),
        inputs,
        outputs,
        uniforms,
        handles,
    })
}

fn collect_varyings(
    module: &Module,
    name: &str,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    out: &mut Vec<Varying>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => {
            if let Some(ty) = varying_type(&module.types[ty].inner) {
                out.push(Varying {
                    name: name.to_owned(),
                    location: *location,
                    ty,
                });
            }
        }
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    let member_name = member.name.as_deref().unwrap_or_default();
                    collect_varyings(module, member_name, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

fn scalar_class(kind: ScalarKind) -> ScalarClass {
    match kind {
        ScalarKind::Float => ScalarClass::Float,
        ScalarKind::Sint => ScalarClass::Sint,
        ScalarKind::Uint => ScalarClass::Uint,
        _ => ScalarClass::Other,
    }
}

fn varying_type(inner: &TypeInner) -> Option<VaryingType> {
    match *inner {
        TypeInner::Scalar(scalar) => Some(VaryingType {
            scalar: scalar_class(scalar.kind),
            components: 1,
        }),
        TypeInner::Vector { size, scalar } => Some(VaryingType {
            scalar: scalar_class(scalar.kind),
            components: size as u32,
        }),
        _ => None,
    }
}

fn uniform_type(inner: &TypeInner) -> UniformType {
    match *inner {
        TypeInner::Scalar(scalar) if scalar.width == 4 => match scalar.kind {
            ScalarKind::Float => UniformType::Float,
            ScalarKind::Sint => UniformType::Int,
            ScalarKind::Uint => UniformType::UInt,
            _ => UniformType::Opaque,
        },
        TypeInner::Vector { size, scalar } if scalar == Scalar::F32 => match size {
            VectorSize::Bi => UniformType::Vec2,
            VectorSize::Tri => UniformType::Vec3,
            VectorSize::Quad => UniformType::Vec4,
        },
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar,
        } if scalar == Scalar::F32 => UniformType::Mat4,
        _ => UniformType::Opaque,
    }
}

fn reflect_uniform(
    module: &Module,
    name: String,
    group: u32,
    binding: u32,
    ty: Handle<Type>,
) -> UniformBufferDesc {
    let inner = &module.types[ty].inner;
    match inner {
        TypeInner::Struct { members, span } => UniformBufferDesc {
            name,
            group,
            binding,
            size: *span,
            fields: members
                .iter()
                .filter_map(|member| {
                    Some(UniformField {
                        name: member.name.clone()?,
                        offset: member.offset,
                        ty: uniform_type(&module.types[member.ty].inner),
                    })
                })
                .collect(),
        },
        other => UniformBufferDesc {
            fields: vec![UniformField {
                name: name.clone(),
                offset: 0,
                ty: uniform_type(other),
            }],
            name,
            group,
            binding,
            size: other.size(module.to_ctx()),
        },
    }
}

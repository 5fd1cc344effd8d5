use crate::mesh::MeshKind;

/// Vertex stage for position + texture-coordinate meshes (the cube).
pub const CUBE_VERTEX_SHADER: &str = r#"
struct Transforms {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> transforms: Transforms;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) tex_coord: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
};

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world = transforms.model * vec4<f32>(vertex.position, 1.0);
    out.clip_position = transforms.projection * transforms.view * world;
    out.tex_coord = vertex.tex_coord;
    return out;
}
"#;

/// Vertex stage for position + colour + texture-coordinate meshes (the quad).
pub const QUAD_VERTEX_SHADER: &str = r#"
struct Transforms {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> transforms: Transforms;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) color: vec3<f32>,
    @location(2) tex_coord: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
    @location(1) color: vec3<f32>,
};

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world = transforms.model * vec4<f32>(vertex.position, 1.0);
    out.clip_position = transforms.projection * transforms.view * world;
    out.tex_coord = vertex.tex_coord;
    out.color = vertex.color;
    return out;
}
"#;

/// Fragment stage blending two textures by `mix_amount`, then tinting.
///
/// `texture1` and `texture2` sample whatever units their slots are set to;
/// an empty unit samples opaque white.
pub const TEXTURED_FRAGMENT_SHADER: &str = r#"
struct Surface {
    tint: vec4<f32>,
    mix_amount: f32,
};

@group(0) @binding(1)
var<uniform> surface: Surface;

@group(1) @binding(0)
var texture1: texture_2d<f32>;
@group(1) @binding(1)
var sampler1: sampler;
@group(1) @binding(2)
var texture2: texture_2d<f32>;
@group(1) @binding(3)
var sampler2: sampler;

@fragment
fn fs_main(@location(0) tex_coord: vec2<f32>) -> @location(0) vec4<f32> {
    let a = textureSample(texture1, sampler1, tex_coord);
    let b = textureSample(texture2, sampler2, tex_coord);
    return mix(a, b, surface.mix_amount) * surface.tint;
}
"#;

pub fn vertex_shader_for(kind: MeshKind) -> &'static str {
    match kind {
        MeshKind::Quad => QUAD_VERTEX_SHADER,
        MeshKind::Cube => CUBE_VERTEX_SHADER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{StageKind, compile, link};

    #[test]
    fn every_preset_links_with_the_fragment_stage() {
        let fs = compile(TEXTURED_FRAGMENT_SHADER, StageKind::Fragment).unwrap();
        for kind in [MeshKind::Quad, MeshKind::Cube] {
            let vs = compile(vertex_shader_for(kind), StageKind::Vertex).unwrap();
            let program = link(&vs, &fs).unwrap();
            let layout = kind.layout();
            for input in &program.interface.vertex_inputs {
                let attr = layout.attribute(input.location).unwrap();
                let location = input.location;
                assert_eq!(attr.components, input.components, "{kind:?} @{location}");
            }
        }
    }
}

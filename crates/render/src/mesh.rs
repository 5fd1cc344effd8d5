//! Geometry owned by a single [`Mesh`]: one vertex buffer, an optional index
//! buffer and the vertex array that reads them.
//!
//! # Invariants
//! - A layout's attributes exactly partition its stride.
//! - Every index addresses a vertex inside the buffer.
//! - A mesh releases its vertex array and buffers exactly once.

use portal_common::{BufferId, VertexArrayId};
use serde::{Deserialize, Serialize};

use crate::context::RenderContext;
use crate::device::GraphicsDevice;
use crate::error::{LayoutError, RenderError};

const FLOAT_BYTES: u32 = std::mem::size_of::<f32>() as u32;

/// One float attribute inside an interleaved vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    /// Number of `f32` components (1 to 4).
    pub components: u32,
    /// Byte offset from the start of the vertex.
    pub offset: u32,
}

impl VertexAttribute {
    pub fn byte_size(&self) -> u32 {
        self.components * FLOAT_BYTES
    }
}

/// Byte-level description of interleaved vertex data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub attributes: Vec<VertexAttribute>,
    /// Bytes between the starts of consecutive vertices.
    pub stride: u32,
}

impl VertexLayout {
    /// Tightly packed attributes in the given order, given as
    /// `(location, components)` pairs.
    pub fn packed(attributes: &[(u32, u32)]) -> Self {
        let mut offset = 0;
        let attributes = attributes
            .iter()
            .map(|&(location, components)| {
                let attr = VertexAttribute {
                    location,
                    components,
                    offset,
                };
                offset += components * FLOAT_BYTES;
                attr
            })
            .collect();
        Self {
            attributes,
            stride: offset,
        }
    }

    /// Position (3) and texture coordinate (2).
    pub fn position_texcoord() -> Self {
        Self::packed(&[(0, 3), (1, 2)])
    }

    /// Position (3), colour (3) and texture coordinate (2).
    pub fn position_color_texcoord() -> Self {
        Self::packed(&[(0, 3), (1, 3), (2, 2)])
    }

    pub fn attribute(&self, location: u32) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.location == location)
    }

    pub fn floats_per_vertex(&self) -> usize {
        (self.stride / FLOAT_BYTES) as usize
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.attributes.is_empty() {
            return Err(LayoutError::NoAttributes);
        }
        for (i, attr) in self.attributes.iter().enumerate() {
            if !(1..=4).contains(&attr.components) {
                return Err(LayoutError::BadComponentCount {
                    location: attr.location,
                    components: attr.components,
                });
            }
            let earlier = &self.attributes[..i];
            if earlier.iter().any(|a| a.location == attr.location) {
                return Err(LayoutError::DuplicateLocation(attr.location));
            }
        }
        let attributes: u32 = self.attributes.iter().map(VertexAttribute::byte_size).sum();
        if attributes != self.stride {
            return Err(LayoutError::StrideMismatch {
                stride: self.stride,
                attributes,
            });
        }
        let mut ordered: Vec<&VertexAttribute> = self.attributes.iter().collect();
        ordered.sort_by_key(|a| a.offset);
        let mut expected = 0;
        for attr in ordered {
            if attr.offset != expected {
                return Err(LayoutError::MisplacedAttribute {
                    location: attr.location,
                    offset: attr.offset,
                    expected,
                });
            }
            expected += attr.byte_size();
        }
        Ok(())
    }
}

/// Built-in geometry presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshKind {
    /// Indexed unit rectangle in the XY plane with per-vertex colour.
    Quad,
    /// Unit cube as 36 non-indexed vertices.
    #[default]
    Cube,
}

#[rustfmt::skip]
const QUAD_VERTICES: [f32; 32] = [
    // position          colour            uv
     0.5,  0.5, 0.0,     1.0, 0.0, 0.0,    1.0, 1.0,
     0.5, -0.5, 0.0,     0.0, 1.0, 0.0,    1.0, 0.0,
    -0.5, -0.5, 0.0,     0.0, 0.0, 0.0,    0.0, 0.0,
    -0.5,  0.5, 0.0,     0.0, 0.0, 1.0,    0.0, 1.0,
];

const QUAD_INDICES: [u32; 6] = [0, 1, 3, 1, 2, 3];

#[rustfmt::skip]
const CUBE_VERTICES: [f32; 180] = [
    -0.5, -0.5, -0.5,  0.0, 0.0,
     0.5, -0.5, -0.5,  1.0, 0.0,
     0.5,  0.5, -0.5,  1.0, 1.0,
     0.5,  0.5, -0.5,  1.0, 1.0,
    -0.5,  0.5, -0.5,  0.0, 1.0,
    -0.5, -0.5, -0.5,  0.0, 0.0,

    -0.5, -0.5,  0.5,  0.0, 0.0,
     0.5, -0.5,  0.5,  1.0, 0.0,
     0.5,  0.5,  0.5,  1.0, 1.0,
     0.5,  0.5,  0.5,  1.0, 1.0,
    -0.5,  0.5,  0.5,  0.0, 1.0,
    -0.5, -0.5,  0.5,  0.0, 0.0,

    -0.5,  0.5,  0.5,  1.0, 0.0,
    -0.5,  0.5, -0.5,  1.0, 1.0,
    -0.5, -0.5, -0.5,  0.0, 1.0,
    -0.5, -0.5, -0.5,  0.0, 1.0,
    -0.5, -0.5,  0.5,  0.0, 0.0,
    -0.5,  0.5,  0.5,  1.0, 0.0,

     0.5,  0.5,  0.5,  1.0, 0.0,
     0.5,  0.5, -0.5,  1.0, 1.0,
     0.5, -0.5, -0.5,  0.0, 1.0,
     0.5, -0.5, -0.5,  0.0, 1.0,
     0.5, -0.5,  0.5,  0.0, 0.0,
     0.5,  0.5,  0.5,  1.0, 0.0,

    -0.5, -0.5, -0.5,  0.0, 1.0,
     0.5, -0.5, -0.5,  1.0, 1.0,
     0.5, -0.5,  0.5,  1.0, 0.0,
     0.5, -0.5,  0.5,  1.0, 0.0,
    -0.5, -0.5,  0.5,  0.0, 0.0,
    -0.5, -0.5, -0.5,  0.0, 1.0,

    -0.5,  0.5, -0.5,  0.0, 1.0,
     0.5,  0.5, -0.5,  1.0, 1.0,
     0.5,  0.5,  0.5,  1.0, 0.0,
     0.5,  0.5,  0.5,  1.0, 0.0,
    -0.5,  0.5,  0.5,  0.0, 0.0,
    -0.5,  0.5, -0.5,  0.0, 1.0,
];

impl MeshKind {
    pub fn layout(self) -> VertexLayout {
        match self {
            MeshKind::Quad => VertexLayout::position_color_texcoord(),
            MeshKind::Cube => VertexLayout::position_texcoord(),
        }
    }

    pub fn vertices(self) -> &'static [f32] {
        match self {
            MeshKind::Quad => &QUAD_VERTICES,
            MeshKind::Cube => &CUBE_VERTICES,
        }
    }

    pub fn indices(self) -> Option<&'static [u32]> {
        match self {
            MeshKind::Quad => Some(&QUAD_INDICES),
            MeshKind::Cube => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MeshKind::Quad => "quad",
            MeshKind::Cube => "cube",
        }
    }
}

/// GPU-resident geometry with a fixed vertex layout.
///
/// Not `Clone`: [`Mesh::destroy`] consumes the handle so it cannot be
/// released twice.
#[derive(Debug)]
pub struct Mesh {
    name: String,
    vertex_buffer: BufferId,
    index_buffer: Option<BufferId>,
    vertex_array: VertexArrayId,
    vertex_count: u32,
    index_count: Option<u32>,
}

impl Mesh {
    /// Upload interleaved `vertices` read through `layout`, with optional
    /// triangle `indices`.
    pub fn create<D: GraphicsDevice>(
        ctx: &mut RenderContext<D>,
        name: &str,
        vertices: &[f32],
        layout: &VertexLayout,
        indices: Option<&[u32]>,
    ) -> Result<Self, RenderError> {
        layout.validate()?;
        if vertices.is_empty() {
            return Err(LayoutError::EmptyVertices.into());
        }
        let per_vertex = layout.floats_per_vertex();
        if vertices.len() % per_vertex != 0 {
            return Err(LayoutError::RaggedVertices {
                floats: vertices.len(),
                per_vertex,
            }
            .into());
        }
        let vertex_count = (vertices.len() / per_vertex) as u32;
        if let Some(&index) = indices.and_then(|ix| ix.iter().find(|&&i| i >= vertex_count)) {
            return Err(LayoutError::IndexOutOfBounds {
                index,
                vertex_count,
            }
            .into());
        }

        let vertex_buffer = ctx.create_vertex_buffer(vertices)?;
        let index_buffer = match indices {
            Some(indices) => match ctx.create_index_buffer(indices) {
                Ok(id) => Some(id),
                Err(e) => {
                    ctx.destroy_buffer(vertex_buffer);
                    return Err(e);
                }
            },
            None => None,
        };
        let vertex_array = match ctx.create_vertex_array(vertex_buffer, index_buffer, layout) {
            Ok(id) => id,
            Err(e) => {
                if let Some(ib) = index_buffer {
                    ctx.destroy_buffer(ib);
                }
                ctx.destroy_buffer(vertex_buffer);
                return Err(e);
            }
        };

        tracing::info!(
            "mesh `{name}` ready: {vertex_count} vertices, {} indices",
            indices.map_or(0, <[u32]>::len)
        );
        Ok(Self {
            name: name.to_owned(),
            vertex_buffer,
            index_buffer,
            vertex_array,
            vertex_count,
            index_count: indices.map(|ix| ix.len() as u32),
        })
    }

    pub fn preset<D: GraphicsDevice>(
        ctx: &mut RenderContext<D>,
        kind: MeshKind,
    ) -> Result<Self, RenderError> {
        let layout = kind.layout();
        Self::create(ctx, kind.name(), kind.vertices(), &layout, kind.indices())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_array(&self) -> VertexArrayId {
        self.vertex_array
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> Option<u32> {
        self.index_count
    }

    pub fn bind<D: GraphicsDevice>(&self, ctx: &mut RenderContext<D>) {
        ctx.bind_vertex_array(Some(self.vertex_array));
    }

    pub fn unbind<D: GraphicsDevice>(&self, ctx: &mut RenderContext<D>) {
        if ctx.bindings().vertex_array() == Some(self.vertex_array) {
            ctx.bind_vertex_array(None);
        }
    }

    /// Draw the whole mesh: every index if it has an index buffer, otherwise
    /// every vertex.
    pub fn draw<D: GraphicsDevice>(&self, ctx: &mut RenderContext<D>) {
        match self.index_count {
            Some(count) => ctx.draw_indexed(count),
            None => ctx.draw_arrays(0, self.vertex_count),
        }
    }

    pub fn draw_arrays<D: GraphicsDevice>(&self, ctx: &mut RenderContext<D>, vertex_count: u32) {
        ctx.draw_arrays(0, vertex_count);
    }

    pub fn draw_indexed<D: GraphicsDevice>(&self, ctx: &mut RenderContext<D>, index_count: u32) {
        ctx.draw_indexed(index_count);
    }

    pub fn destroy<D: GraphicsDevice>(self, ctx: &mut RenderContext<D>) {
        ctx.destroy_vertex_array(self.vertex_array);
        ctx.destroy_buffer(self.vertex_buffer);
        if let Some(ib) = self.index_buffer {
            ctx.destroy_buffer(ib);
        }
        tracing::debug!("mesh `{}` destroyed", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    fn context() -> RenderContext<HeadlessDevice> {
        RenderContext::new(HeadlessDevice::new())
    }

    fn layout_error<T>(result: Result<T, RenderError>) -> LayoutError {
        match result {
            Err(RenderError::Layout(err)) => err,
            Err(other) => panic!("expected a layout error, got {other}"),
            Ok(_) => panic!("expected a layout error"),
        }
    }

    #[test]
    fn packed_layouts_partition_their_stride() {
        let layout = VertexLayout::position_color_texcoord();
        assert_eq!(layout.stride, 32);
        assert_eq!(layout.attribute(2).map(|a| a.offset), Some(24));
        assert!(layout.validate().is_ok());
        assert_eq!(VertexLayout::position_texcoord().stride, 20);
    }

    #[test]
    fn stride_mismatch_is_rejected() {
        let mut ctx = context();
        let mut layout = VertexLayout::packed(&[(0, 3), (1, 3)]);
        layout.stride = 32;
        let result = Mesh::create(&mut ctx, "bad", &[0.0; 16], &layout, None);
        let expected = LayoutError::StrideMismatch {
            stride: 32,
            attributes: 24,
        };
        assert_eq!(layout_error(result), expected);
        assert!(ctx.live_resources().is_empty());
    }

    #[test]
    fn malformed_layouts_are_rejected() {
        assert_eq!(
            VertexLayout::packed(&[]).validate(),
            Err(LayoutError::NoAttributes)
        );
        assert_eq!(
            VertexLayout::packed(&[(0, 3), (0, 2)]).validate(),
            Err(LayoutError::DuplicateLocation(0))
        );
        let expected = LayoutError::BadComponentCount {
            location: 0,
            components: 5,
        };
        assert_eq!(VertexLayout::packed(&[(0, 5)]).validate(), Err(expected));
    }

    #[test]
    fn overlapping_attributes_are_rejected() {
        let mut layout = VertexLayout::position_texcoord();
        layout.attributes[1].offset = 0;
        let expected = LayoutError::MisplacedAttribute {
            location: 1,
            offset: 0,
            expected: 12,
        };
        assert_eq!(layout.validate(), Err(expected));
    }

    #[test]
    fn attribute_past_the_stride_is_rejected() {
        let mut ctx = context();
        let mut layout = VertexLayout::position_texcoord();
        // Ends at byte 24 of a 20 byte vertex.
        layout.attributes[1].offset = 16;
        let result = Mesh::create(&mut ctx, "overrun", &[0.0; 15], &layout, None);
        let expected = LayoutError::MisplacedAttribute {
            location: 1,
            offset: 16,
            expected: 12,
        };
        assert_eq!(layout_error(result), expected);
        assert!(ctx.live_resources().is_empty());
    }

    #[test]
    fn attributes_may_be_declared_out_of_offset_order() {
        let mut layout = VertexLayout::position_texcoord();
        layout.attributes.reverse();
        assert!(layout.validate().is_ok());

        // Gap at the front: offsets 4 and 16 leave bytes 0..4 unused.
        layout.attributes[0].offset = 16;
        layout.attributes[1].offset = 4;
        let expected = LayoutError::MisplacedAttribute {
            location: 0,
            offset: 4,
            expected: 0,
        };
        assert_eq!(layout.validate(), Err(expected));
    }

    #[test]
    fn vertex_data_must_fill_whole_vertices() {
        let mut ctx = context();
        let layout = VertexLayout::position_texcoord();
        let empty = Mesh::create(&mut ctx, "empty", &[], &layout, None);
        assert_eq!(layout_error(empty), LayoutError::EmptyVertices);
        let ragged = Mesh::create(&mut ctx, "ragged", &[0.0; 7], &layout, None);
        let expected = LayoutError::RaggedVertices {
            floats: 7,
            per_vertex: 5,
        };
        assert_eq!(layout_error(ragged), expected);
    }

    #[test]
    fn out_of_bounds_index_is_rejected() {
        let mut ctx = context();
        let layout = VertexLayout::packed(&[(0, 3)]);
        let indices = [0, 1, 3];
        let result = Mesh::create(&mut ctx, "tri", &[0.0; 9], &layout, Some(&indices));
        let expected = LayoutError::IndexOutOfBounds {
            index: 3,
            vertex_count: 3,
        };
        assert_eq!(layout_error(result), expected);
        assert!(ctx.live_resources().is_empty());
    }

    #[test]
    fn presets_have_expected_shape() {
        let mut ctx = context();
        let quad = Mesh::preset(&mut ctx, MeshKind::Quad).unwrap();
        assert_eq!(quad.vertex_count(), 4);
        assert_eq!(quad.index_count(), Some(6));
        let cube = Mesh::preset(&mut ctx, MeshKind::Cube).unwrap();
        assert_eq!(cube.vertex_count(), 36);
        assert_eq!(cube.index_count(), None);
        // One vertex array and one vertex buffer each, plus the quad's index buffer.
        assert_eq!(ctx.live_resources().len(), 5);
        quad.destroy(&mut ctx);
        cube.destroy(&mut ctx);
        assert!(ctx.live_resources().is_empty());
    }

    #[test]
    fn unbind_only_clears_own_binding() {
        let mut ctx = context();
        let a = Mesh::preset(&mut ctx, MeshKind::Quad).unwrap();
        let b = Mesh::preset(&mut ctx, MeshKind::Cube).unwrap();
        a.bind(&mut ctx);
        b.bind(&mut ctx);
        a.unbind(&mut ctx);
        assert_eq!(ctx.bindings().vertex_array(), Some(b.vertex_array()));
        b.unbind(&mut ctx);
        assert_eq!(ctx.bindings().vertex_array(), None);
        a.destroy(&mut ctx);
        b.destroy(&mut ctx);
    }

    #[test]
    fn mesh_kind_parses_lowercase() {
        let kind: MeshKind = serde_yaml::from_str("quad").unwrap();
        assert_eq!(kind, MeshKind::Quad);
    }
}

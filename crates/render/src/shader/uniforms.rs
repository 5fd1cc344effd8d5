use std::collections::HashMap;

use glam::{Mat4, Vec2, Vec3, Vec4};

use super::reflect::{ProgramInterface, UniformType};

/// A value the host can write into a uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

/// CPU-side contents of one uniform binding, uploaded with every draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBuffer {
    pub group: u32,
    pub binding: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct FieldRef {
    buffer: usize,
    offset: usize,
    ty: UniformType,
}

/// Uniform staging for one linked program.
///
/// Names resolve against the program's reflected interface. Setting a name
/// the program does not declare is a no-op, so shader variants may omit
/// optional uniforms.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    buffers: Vec<UniformBuffer>,
    fields: HashMap<String, FieldRef>,
    /// Texture slot name and the texture unit it samples, in slot order.
    texture_units: Vec<(String, u32)>,
}

impl UniformBlock {
    pub fn new(interface: &ProgramInterface) -> Self {
        let mut fields = HashMap::new();
        let mut buffers = Vec::with_capacity(interface.uniform_buffers.len());
        for (index, desc) in interface.uniform_buffers.iter().enumerate() {
            for field in &desc.fields {
                if fields.contains_key(&field.name) {
                    tracing::warn!(
                        "uniform field `{}` declared more than once; the first declaration wins",
                        field.name
                    );
                    continue;
                }
                fields.insert(
                    field.name.clone(),
                    FieldRef {
                        buffer: index,
                        offset: field.offset as usize,
                        ty: field.ty,
                    },
                );
            }
            buffers.push(UniformBuffer {
                group: desc.group,
                binding: desc.binding,
                bytes: vec![0; desc.size as usize],
            });
        }
        let texture_units = interface
            .texture_slots
            .iter()
            .map(|slot| (slot.name.clone(), 0))
            .collect();
        Self {
            buffers,
            fields,
            texture_units,
        }
    }

    /// Write `value` to the uniform called `name`. Returns whether anything was written.
    pub fn set(&mut self, name: &str, value: UniformValue) -> bool {
        if let Some((_, unit)) = self.texture_units.iter_mut().find(|(slot, _)| slot == name) {
            return match value {
                UniformValue::Int(u) if u >= 0 => {
                    *unit = u as u32;
                    true
                }
                UniformValue::UInt(u) => {
                    *unit = u;
                    true
                }
                other => {
                    tracing::warn!("texture slot `{name}` takes a unit number, not {other:?}");
                    false
                }
            };
        }

        let Some(field) = self.fields.get(name).copied() else {
            return false;
        };
        let mut scratch = [0u8; 64];
        let len = match (value, field.ty) {
            (UniformValue::Bool(v), UniformType::Int) => stage(&mut scratch, &[v as i32]),
            (UniformValue::Bool(v), UniformType::UInt) => stage(&mut scratch, &[v as u32]),
            (UniformValue::Int(v), UniformType::Int) => stage(&mut scratch, &[v]),
            (UniformValue::UInt(v), UniformType::UInt) => stage(&mut scratch, &[v]),
            (UniformValue::Float(v), UniformType::Float) => stage(&mut scratch, &[v]),
            (UniformValue::Vec2(v), UniformType::Vec2) => stage(&mut scratch, &v.to_array()),
            (UniformValue::Vec3(v), UniformType::Vec3) => stage(&mut scratch, &v.to_array()),
            (UniformValue::Vec4(v), UniformType::Vec4) => stage(&mut scratch, &v.to_array()),
            // Column-major, untransposed.
            (UniformValue::Mat4(m), UniformType::Mat4) => stage(&mut scratch, &m.to_cols_array()),
            (value, ty) => {
                tracing::warn!("uniform `{name}` is {ty:?}; ignoring {value:?}");
                return false;
            }
        };
        let target = &mut self.buffers[field.buffer].bytes;
        target[field.offset..field.offset + len].copy_from_slice(&scratch[..len]);
        true
    }

    /// Read back the current value of a uniform field or texture slot.
    pub fn get(&self, name: &str) -> Option<UniformValue> {
        if let Some((_, unit)) = self.texture_units.iter().find(|(slot, _)| slot == name) {
            return Some(UniformValue::UInt(*unit));
        }
        let field = self.fields.get(name)?;
        let bytes = &self.buffers[field.buffer].bytes[field.offset..];
        let floats = |n: usize| -> Vec<f32> { bytemuck::pod_collect_to_vec(&bytes[..n * 4]) };
        Some(match field.ty {
            UniformType::Float => UniformValue::Float(bytemuck::pod_read_unaligned(&bytes[..4])),
            UniformType::Int => UniformValue::Int(bytemuck::pod_read_unaligned(&bytes[..4])),
            UniformType::UInt => UniformValue::UInt(bytemuck::pod_read_unaligned(&bytes[..4])),
            UniformType::Vec2 => UniformValue::Vec2(Vec2::from_slice(&floats(2))),
            UniformType::Vec3 => UniformValue::Vec3(Vec3::from_slice(&floats(3))),
            UniformType::Vec4 => UniformValue::Vec4(Vec4::from_slice(&floats(4))),
            UniformType::Mat4 => UniformValue::Mat4(Mat4::from_cols_slice(&floats(16))),
            UniformType::Opaque => return None,
        })
    }

    /// Unit sampled by the texture slot at `slot_index`.
    pub fn texture_unit(&self, slot_index: usize) -> Option<u32> {
        self.texture_units.get(slot_index).map(|(_, unit)| *unit)
    }

    pub fn buffers(&self) -> &[UniformBuffer] {
        &self.buffers
    }
}

fn stage<T: bytemuck::Pod>(scratch: &mut [u8; 64], values: &[T]) -> usize {
    let bytes: &[u8] = bytemuck::cast_slice(values);
    scratch[..bytes.len()].copy_from_slice(bytes);
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{StageKind, compile, link};
    use crate::shaders;

    fn block() -> UniformBlock {
        let vs = compile(shaders::CUBE_VERTEX_SHADER, StageKind::Vertex).unwrap();
        let fs = compile(shaders::TEXTURED_FRAGMENT_SHADER, StageKind::Fragment).unwrap();
        UniformBlock::new(&link(&vs, &fs).unwrap().interface)
    }

    #[test]
    fn mat4_round_trips_column_major() {
        let mut uniforms = block();
        let m = Mat4::from_cols_array(&[
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0,
        ]);
        assert!(uniforms.set("model", UniformValue::Mat4(m)));
        assert_eq!(uniforms.get("model"), Some(UniformValue::Mat4(m)));

        // First column lands first in the buffer; `model` sits at offset 0.
        let model = &uniforms.buffers()[0].bytes[..4];
        let first: f32 = bytemuck::pod_read_unaligned(model);
        assert_eq!(first, 1.0);
    }

    #[test]
    fn unknown_name_is_a_no_op() {
        let mut uniforms = block();
        uniforms.set("view", UniformValue::Mat4(Mat4::from_translation(Vec3::X)));
        let before = uniforms.buffers().to_vec();

        assert!(!uniforms.set("does_not_exist", UniformValue::Float(1.0)));
        let identity = UniformValue::Mat4(Mat4::IDENTITY);
        assert!(!uniforms.set("lightColor", identity));

        assert_eq!(uniforms.buffers(), &before[..]);
        assert_eq!(
            uniforms.get("view"),
            Some(UniformValue::Mat4(Mat4::from_translation(Vec3::X)))
        );
    }

    #[test]
    fn type_mismatch_is_ignored() {
        let mut uniforms = block();
        uniforms.set("mix_amount", UniformValue::Float(0.2));
        let identity = UniformValue::Mat4(Mat4::IDENTITY);
        assert!(!uniforms.set("mix_amount", identity));
        assert_eq!(uniforms.get("mix_amount"), Some(UniformValue::Float(0.2)));
    }

    #[test]
    fn texture_slots_take_unit_numbers() {
        let mut uniforms = block();
        assert_eq!(uniforms.texture_unit(0), Some(0));
        assert_eq!(uniforms.texture_unit(1), Some(0));
        assert!(uniforms.set("texture2", UniformValue::Int(1)));
        assert_eq!(uniforms.texture_unit(1), Some(1));
        assert_eq!(uniforms.get("texture2"), Some(UniformValue::UInt(1)));
        assert!(!uniforms.set("texture1", UniformValue::Int(-1)));
        assert_eq!(uniforms.texture_unit(0), Some(0));
    }

    #[test]
    fn vec4_field_after_scalar_keeps_offsets() {
        let mut uniforms = block();
        uniforms.set("tint", UniformValue::Vec4(Vec4::new(0.5, 0.25, 1.0, 1.0)));
        uniforms.set("mix_amount", UniformValue::Float(0.8));
        assert_eq!(
            uniforms.get("tint"),
            Some(UniformValue::Vec4(Vec4::new(0.5, 0.25, 1.0, 1.0)))
        );
        assert_eq!(uniforms.get("mix_amount"), Some(UniformValue::Float(0.8)));
    }
}

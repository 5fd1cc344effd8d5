use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

resource_id!(
    /// Opaque identifier of a GPU vertex or index buffer.
    BufferId,
    "buffer"
);
resource_id!(
    /// Opaque identifier of a vertex-layout binding (buffer + attribute layout).
    VertexArrayId,
    "vertex_array"
);
resource_id!(
    /// Opaque identifier of an immutable 2D texture.
    TextureId,
    "texture"
);
resource_id!(
    /// Opaque identifier of a linked shader program.
    ProgramId,
    "program"
);

/// Object pose: world position plus a rotation of `angle_degrees` about `axis`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub angle_degrees: f32,
    pub axis: Vec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            angle_degrees: 0.0,
            axis: Vec3::new(1.0, 0.3, 0.5),
        }
    }
}

impl Pose {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

/// Render surface size in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height. A zero height (minimised window) is treated as one pixel.
    pub fn aspect_ratio(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}

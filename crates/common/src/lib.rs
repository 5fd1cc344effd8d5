//! Shared types for the portal renderer.
//!
//! # Invariants
//! - Resource identifiers are never reused within one render context.
//! - A `Pose` is plain data; turning it into a matrix is the transform pipeline's job.

mod types;

pub use types::{BufferId, Pose, ProgramId, TextureId, VertexArrayId, Viewport};

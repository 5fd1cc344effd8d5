//! wgpu backend for the portal render core.
//!
//! Implements [`portal_render::GraphicsDevice`]: buffers, textures with
//! samplers, shader modules and one render pass per frame.
//!
//! # Invariants
//! - Draws are recorded during the frame and encoded at `present`, each with
//!   the uniform contents it was submitted with.
//! - A texture slot whose unit is empty samples a 1x1 white texture.
//! - Render pipelines are cached per (program, vertex layout, depth test).

mod convert;
mod gpu;

pub use gpu::WgpuDevice;

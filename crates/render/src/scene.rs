use glam::Vec4;

use crate::config::{DrawableConfig, SceneConfig};
use crate::context::RenderContext;
use crate::device::GraphicsDevice;
use crate::error::RenderError;
use crate::mesh::Mesh;
use crate::shader::{ShaderProgram, UniformValue};
use crate::shaders;
use crate::texture::Texture;

/// A texture and the unit it is bound to every frame.
#[derive(Debug)]
pub struct BoundTexture {
    pub texture: Texture,
    pub unit: u32,
}

/// The GPU resources one configured scene owns: a program, one mesh shared
/// by every drawable, and the textures that were found on disk.
#[derive(Debug)]
pub struct Scene {
    program: ShaderProgram,
    mesh: Mesh,
    textures: Vec<BoundTexture>,
    drawables: Vec<DrawableConfig>,
}

impl Scene {
    pub fn build<D: GraphicsDevice>(
        ctx: &mut RenderContext<D>,
        config: &SceneConfig,
    ) -> Result<Self, RenderError> {
        let program = match &config.shaders {
            Some(paths) => ShaderProgram::from_files(ctx, &paths.vertex, &paths.fragment)?,
            None => ShaderProgram::new(
                ctx,
                shaders::vertex_shader_for(config.mesh),
                shaders::TEXTURED_FRAGMENT_SHADER,
            )?,
        };
        let mesh = match Mesh::preset(ctx, config.mesh) {
            Ok(mesh) => mesh,
            Err(e) => {
                program.destroy(ctx);
                return Err(e);
            }
        };

        let mut textures = Vec::new();
        for entry in &config.textures {
            // The slot samples its unit whether or not the file loaded; an
            // empty unit renders as plain white.
            if !program.set_uniform(ctx, &entry.uniform, UniformValue::Int(entry.unit as i32)) {
                tracing::warn!("program has no texture slot `{}`", entry.uniform);
            }
            let (unit, flip) = (entry.unit, entry.flip_vertically);
            if let Some(texture) = Texture::load_or_skip(ctx, &entry.path, flip, &entry.sampler) {
                let (width, height) = texture.size();
                tracing::debug!("texture unit {unit} holds a {width}x{height} image");
                textures.push(BoundTexture { texture, unit });
            }
        }

        program.set_float(ctx, "mix_amount", config.mix_amount);
        let tint = Vec4::from_array(config.tint);
        program.set_uniform(ctx, "tint", UniformValue::Vec4(tint));

        tracing::info!(
            "scene ready: {} mesh, {} of {} textures, {} drawables",
            mesh.name(),
            textures.len(),
            config.textures.len(),
            config.drawables.len()
        );
        Ok(Self {
            program,
            mesh,
            textures,
            drawables: config.drawables.clone(),
        })
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn textures(&self) -> &[BoundTexture] {
        &self.textures
    }

    pub fn drawables(&self) -> &[DrawableConfig] {
        &self.drawables
    }

    pub fn bind_textures<D: GraphicsDevice>(&self, ctx: &mut RenderContext<D>) {
        for bound in &self.textures {
            bound.texture.bind(ctx, bound.unit);
        }
    }

    pub fn destroy<D: GraphicsDevice>(self, ctx: &mut RenderContext<D>) {
        for bound in self.textures {
            bound.texture.destroy(ctx);
        }
        self.mesh.destroy(ctx);
        self.program.destroy(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ShaderPaths, TextureConfig};
    use crate::headless::HeadlessDevice;
    use crate::mesh::MeshKind;
    use crate::texture::SamplerConfig;
    use std::path::Path;

    fn texture_entry(path: &Path, uniform: &str, unit: u32) -> TextureConfig {
        TextureConfig {
            path: path.to_path_buf(),
            uniform: uniform.into(),
            unit,
            flip_vertically: true,
            sampler: SamplerConfig::default(),
        }
    }

    #[test]
    fn missing_textures_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        image::RgbaImage::new(2, 2).save(&good).unwrap();

        let config = SceneConfig {
            textures: vec![
                texture_entry(&good, "texture1", 0),
                texture_entry(&dir.path().join("missing.png"), "texture2", 1),
            ],
            ..SceneConfig::default()
        };
        let mut ctx = RenderContext::new(HeadlessDevice::new());
        let scene = Scene::build(&mut ctx, &config).unwrap();
        assert_eq!(scene.textures().len(), 1);
        assert_eq!(
            scene.program().uniform(&ctx, "texture2"),
            Some(UniformValue::UInt(1))
        );
        let mix = scene.program().uniform(&ctx, "mix_amount");
        assert_eq!(mix, Some(UniformValue::Float(0.2)));
        scene.destroy(&mut ctx);
        assert!(ctx.live_resources().is_empty());
    }

    #[test]
    fn quad_scene_uses_matching_vertex_stage() {
        let config = SceneConfig {
            mesh: MeshKind::Quad,
            textures: Vec::new(),
            ..SceneConfig::default()
        };
        let mut ctx = RenderContext::new(HeadlessDevice::new());
        let scene = Scene::build(&mut ctx, &config).unwrap();
        let interface = scene.program().interface(&ctx).unwrap();
        assert_eq!(interface.vertex_inputs.len(), 3);
        scene.destroy(&mut ctx);
    }

    #[test]
    fn broken_custom_shader_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let vertex = dir.path().join("broken.wgsl");
        std::fs::write(&vertex, "@vertex fn vs_main( {").unwrap();
        let fragment = dir.path().join("fragment.wgsl");
        std::fs::write(&fragment, shaders::TEXTURED_FRAGMENT_SHADER).unwrap();

        let config = SceneConfig {
            shaders: Some(ShaderPaths { vertex, fragment }),
            ..SceneConfig::default()
        };
        let mut ctx = RenderContext::new(HeadlessDevice::new());
        let err = Scene::build(&mut ctx, &config).unwrap_err();
        assert!(matches!(err, RenderError::Compile(_)));
        assert!(ctx.live_resources().is_empty());
    }
}

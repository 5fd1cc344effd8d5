use std::path::Path;

use portal_common::TextureId;
use serde::{Deserialize, Serialize};

use crate::context::RenderContext;
use crate::device::GraphicsDevice;
use crate::error::{RenderError, TextureLoadError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    Linear,
    Nearest,
}

/// Sampling state fixed when a texture is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub wrap: WrapMode,
    pub filter: FilterMode,
}

/// Decoded pixels: `width * height * channels` bytes, rows top to bottom
/// unless flipped at decode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    width: u32,
    height: u32,
    channels: u8,
    pixels: Vec<u8>,
}

impl TextureImage {
    /// Wrap raw 8-bit pixels. `None` if the size is zero, the channel count
    /// is outside 1..=4, or the byte count does not match.
    pub fn new(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * channels as usize;
        if width == 0 || height == 0 || !(1..=4).contains(&channels) || pixels.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            channels,
            pixels,
        })
    }

    /// Decode an image file, keeping its channel count. With `flip_vertically`
    /// the first row of `pixels` is the bottom of the picture, matching
    /// texture coordinates whose origin is the lower-left corner.
    pub fn decode(path: impl AsRef<Path>, flip_vertically: bool) -> Result<Self, TextureLoadError> {
        let path = path.as_ref();
        let fail = |reason: String| TextureLoadError {
            path: path.to_path_buf(),
            reason,
        };
        let mut img = image::open(path).map_err(|e| fail(e.to_string()))?;
        if flip_vertically {
            img = img.flipv();
        }
        let (width, height) = (img.width(), img.height());
        let channels = img.color().channel_count();
        let pixels = match channels {
            1 => img.into_luma8().into_raw(),
            2 => img.into_luma_alpha8().into_raw(),
            3 => img.into_rgb8().into_raw(),
            _ => img.into_rgba8().into_raw(),
        };
        let channels = channels.clamp(1, 4);
        let empty = || fail(format!("decoded to an empty {width}x{height} image"));
        Self::new(width, height, channels, pixels).ok_or_else(empty)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Expand to four channels. Grey is replicated, missing alpha is opaque.
    pub fn to_rgba8(&self) -> Vec<u8> {
        if self.channels == 4 {
            return self.pixels.clone();
        }
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for px in self.pixels.chunks_exact(self.channels as usize) {
            let rgba = match *px {
                [l] => [l, l, l, 255],
                [l, a] => [l, l, l, a],
                [r, g, b] => [r, g, b, 255],
                _ => [0, 0, 0, 255],
            };
            out.extend_from_slice(&rgba);
        }
        out
    }
}

/// An immutable 2D texture owned by the caller.
#[derive(Debug)]
pub struct Texture {
    id: TextureId,
    width: u32,
    height: u32,
}

impl Texture {
    pub fn create<D: GraphicsDevice>(
        ctx: &mut RenderContext<D>,
        image: &TextureImage,
        sampler: &SamplerConfig,
    ) -> Result<Self, RenderError> {
        let id = ctx.create_texture(image, sampler)?;
        Ok(Self {
            id,
            width: image.width(),
            height: image.height(),
        })
    }

    pub fn load<D: GraphicsDevice>(
        ctx: &mut RenderContext<D>,
        path: impl AsRef<Path>,
        flip_vertically: bool,
        sampler: &SamplerConfig,
    ) -> Result<Self, RenderError> {
        let image = TextureImage::decode(path.as_ref(), flip_vertically)?;
        let texture = Self::create(ctx, &image, sampler)?;
        tracing::info!(
            "loaded texture {} ({}x{}, {} channels)",
            path.as_ref().display(),
            image.width(),
            image.height(),
            image.channels()
        );
        Ok(texture)
    }

    /// Like [`Texture::load`], but a missing or undecodable file is logged and
    /// yields `None` so the caller can render without it.
    pub fn load_or_skip<D: GraphicsDevice>(
        ctx: &mut RenderContext<D>,
        path: impl AsRef<Path>,
        flip_vertically: bool,
        sampler: &SamplerConfig,
    ) -> Option<Self> {
        match Self::load(ctx, path, flip_vertically, sampler) {
            Ok(texture) => Some(texture),
            Err(e) => {
                tracing::warn!("{e}; rendering without it");
                None
            }
        }
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bind to a numbered texture unit.
    pub fn bind<D: GraphicsDevice>(&self, ctx: &mut RenderContext<D>, unit: u32) {
        ctx.bind_texture(unit, Some(self.id));
    }

    pub fn destroy<D: GraphicsDevice>(self, ctx: &mut RenderContext<D>) {
        ctx.destroy_texture(self.id);
    }
}

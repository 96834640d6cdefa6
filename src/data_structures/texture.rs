//! Textures and texture loading.
//!
//! This module provides [`Texture`], a handle to an image uploaded to a
//! [`GraphicsContext`] together with its size, and helpers to load textures
//! from `.ppm`, `.png` or `.jpeg` files.

use std::path::Path;

use crate::{
    context::{GraphicsContext, TextureId},
    error::Result,
    resources::{self, Image},
};

/// An uploaded RGB image.
///
/// Typically created via [`load`](Self::load) or [`from_image`](Self::from_image)
/// and bound to a sampler slot before drawing. The texture owns its GPU image
/// and frees it in [`release`](Self::release).
#[derive(Debug, PartialEq, Eq)]
pub struct Texture {
    id: TextureId,
    width: u32,
    height: u32,
}

impl Texture {
    /// Load an image file and upload it.
    ///
    /// # Arguments
    ///
    /// * `path` is a `.ppm`, `.png` or `.jpeg` file
    /// * `flip` reverses the row order so the first row is the bottom of the picture
    pub fn load(ctx: &mut dyn GraphicsContext, path: impl AsRef<Path>, flip: bool) -> Result<Self> {
        let path = path.as_ref();
        let image = resources::load_image(path, flip)?;
        Self::from_image(ctx, &path.display().to_string(), &image)
    }

    pub fn from_image(ctx: &mut dyn GraphicsContext, label: &str, image: &Image) -> Result<Self> {
        let id = ctx.create_texture(label, image)?;
        Ok(Self {
            id,
            width: image.width(),
            height: image.height(),
        })
    }

    /// Wrap a texture the context created itself, e.g. a framebuffer attachment.
    pub(crate) fn from_raw(id: TextureId, width: u32, height: u32) -> Self {
        Self { id, width, height }
    }

    pub fn release(self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        ctx.destroy_texture(self.id)
    }

    pub fn bind(&self, ctx: &mut dyn GraphicsContext, slot: u32) -> Result<()> {
        ctx.bind_texture(slot, self.id)
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

//! Textured objects.

use std::path::Path;

use crate::{
    context::GraphicsContext,
    data_structures::geometry::Geometry,
    error::Result,
    render::{Drawable, Mesh},
};

use super::texture::Texture;

pub const DIFFUSE_SLOT: u32 = 0;
pub const DETAIL_SLOT: u32 = 1;

/// A mesh with a diffuse texture and an optional detail texture.
#[derive(Debug)]
pub struct Object {
    mesh: Mesh,
    diffuse: Texture,
    detail: Option<Texture>,
}

impl Object {
    pub fn new(mesh: Mesh, diffuse: Texture) -> Self {
        Self {
            mesh,
            diffuse,
            detail: None,
        }
    }

    /// The unit quad in the xy plane spanning -1..1 with uvs 0..1.
    pub fn quad_geometry() -> Result<Geometry> {
        let mut geometry = Geometry::new();
        geometry.add_vertex(-1.0, -1.0, 0.0, 0.0, 0.0);
        geometry.add_vertex(1.0, -1.0, 0.0, 1.0, 0.0);
        geometry.add_vertex(1.0, 1.0, 0.0, 1.0, 1.0);
        geometry.add_vertex(-1.0, 1.0, 0.0, 0.0, 1.0);
        geometry.make_triangle(0, 1, 2)?;
        geometry.make_triangle(2, 3, 0)?;
        Ok(geometry)
    }

    /// Upload a textured quad. The texture is loaded bottom row first.
    pub fn make_textured_quad(ctx: &mut dyn GraphicsContext, texture: impl AsRef<Path>) -> Result<Self> {
        let mesh = Mesh::from_geometry(ctx, "textured quad", &Self::quad_geometry()?)?;
        let diffuse = Texture::load(ctx, texture, true)?;
        Ok(Self::new(mesh, diffuse))
    }

    /// Replace the diffuse texture, freeing the previous one.
    pub fn load_texture(&mut self, ctx: &mut dyn GraphicsContext, path: impl AsRef<Path>) -> Result<()> {
        let diffuse = Texture::load(ctx, path, true)?;
        std::mem::replace(&mut self.diffuse, diffuse).release(ctx)
    }

    /// Replace the detail texture, freeing the previous one.
    pub fn set_detail(&mut self, ctx: &mut dyn GraphicsContext, detail: Option<Texture>) -> Result<()> {
        match std::mem::replace(&mut self.detail, detail) {
            Some(old) => old.release(ctx),
            None => Ok(()),
        }
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn diffuse(&self) -> &Texture {
        &self.diffuse
    }

    pub fn detail(&self) -> Option<&Texture> {
        self.detail.as_ref()
    }
}

impl Drawable for Object {
    fn bind(&self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        self.diffuse.bind(ctx, DIFFUSE_SLOT)?;
        if let Some(detail) = &self.detail {
            detail.bind(ctx, DETAIL_SLOT)?;
        }
        Ok(())
    }

    fn render(&self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        self.bind(ctx)?;
        self.mesh.draw(ctx)
    }

    fn sampler_uniforms(&self) -> Vec<(&'static str, i32)> {
        let mut samplers = vec![("u_DiffuseMap", DIFFUSE_SLOT as i32)];
        if self.detail.is_some() {
            samplers.push(("u_DetailMap", DETAIL_SLOT as i32));
        }
        samplers
    }

    fn release(self: Box<Self>, ctx: &mut dyn GraphicsContext) -> Result<()> {
        let Object {
            mesh,
            diffuse,
            detail,
        } = *self;
        mesh.release(ctx)?;
        diffuse.release(ctx)?;
        detail.map_or(Ok(()), |detail| detail.release(ctx))
    }
}

//! Drawables and uploaded meshes.
//!
//! A [`Drawable`] is anything a scene node can carry: it binds its own GPU
//! resources (textures) and issues its draw calls through the context. The
//! program and its per-frame uniforms are the scene graph's job, the drawable
//! only reports which sampler slots it expects via
//! [`Drawable::sampler_uniforms`].
//!
//! GPU handles are owned exclusively: [`Mesh`] is not `Clone`, and a drawable
//! hands its meshes and textures back to the context in [`Drawable::release`].
//!
//! # Key types
//!
//! - [`Drawable`] the polymorphic render interface (objects, terrain, ...)
//! - [`Mesh`] vertex and index buffers living in a [`GraphicsContext`]
//!

use crate::{
    context::{GraphicsContext, MeshId},
    data_structures::{geometry::Geometry, layout::VertexBufferLayout},
    error::Result,
};

pub trait Drawable {
    /// Bind textures and other per-drawable state.
    fn bind(&self, ctx: &mut dyn GraphicsContext) -> Result<()>;

    fn render(&self, ctx: &mut dyn GraphicsContext) -> Result<()>;

    /// Sampler uniforms and the slots they read from, e.g. `("u_DiffuseMap", 0)`.
    fn sampler_uniforms(&self) -> Vec<(&'static str, i32)> {
        Vec::new()
    }

    /// Free the GPU resources this drawable owns.
    fn release(self: Box<Self>, _ctx: &mut dyn GraphicsContext) -> Result<()> {
        Ok(())
    }
}

/// Geometry uploaded to a context.
///
/// Dropping a mesh without [`release`](Self::release) keeps its buffers alive
/// until the context itself is dropped.
#[derive(Debug)]
pub struct Mesh {
    id: MeshId,
    index_count: usize,
    layout: VertexBufferLayout,
}

impl Mesh {
    /// Upload `geometry` with the 14-float normal mapped layout.
    pub fn from_geometry(
        ctx: &mut dyn GraphicsContext,
        label: &str,
        geometry: &Geometry,
    ) -> Result<Self> {
        Self::from_raw(
            ctx,
            label,
            VertexBufferLayout::normal_mapped(),
            &geometry.interleave(),
            geometry.indices(),
        )
    }

    pub fn from_raw(
        ctx: &mut dyn GraphicsContext,
        label: &str,
        layout: VertexBufferLayout,
        vertices: &[f32],
        indices: &[u32],
    ) -> Result<Self> {
        let id = ctx.create_mesh(label, &layout, vertices, indices)?;
        Ok(Self {
            id,
            index_count: indices.len(),
            layout,
        })
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn index_count(&self) -> usize {
        self.index_count
    }

    pub fn layout(&self) -> &VertexBufferLayout {
        &self.layout
    }

    pub fn draw(&self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        ctx.draw_indexed(self.id)
    }

    pub fn release(self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        ctx.destroy_mesh(self.id)
    }
}

//! Off-screen render target and the full-screen quad that composites it.

use crate::{
    context::{FramebufferId, GraphicsContext, ProgramId, Uniform},
    data_structures::layout::VertexBufferLayout,
    error::Result,
    render::Mesh,
};

use super::texture::Texture;

/// Two triangles covering clip space, `x, y, s, t` per vertex.
#[rustfmt::skip]
pub const SCREEN_QUAD: [f32; 24] = [
    -1.0,  1.0, 0.0, 1.0,
    -1.0, -1.0, 0.0, 0.0,
     1.0, -1.0, 1.0, 0.0,
    -1.0,  1.0, 0.0, 1.0,
     1.0, -1.0, 1.0, 0.0,
     1.0,  1.0, 1.0, 1.0,
];

/// Owns its target, colour attachment and quad; [`release`](Self::release) frees all three.
#[derive(Debug)]
pub struct Framebuffer {
    id: FramebufferId,
    colour: Texture,
    quad: Mesh,
    program: ProgramId,
}

impl Framebuffer {
    /// `program` samples `u_DiffuseMap` and draws it unchanged.
    pub fn new(ctx: &mut dyn GraphicsContext, program: ProgramId, width: u32, height: u32) -> Result<Self> {
        let (id, colour) = ctx.create_framebuffer(width, height)?;
        let quad = Mesh::from_raw(
            ctx,
            "screen quad",
            VertexBufferLayout::screen_quad(),
            &SCREEN_QUAD,
            &[0, 1, 2, 3, 4, 5],
        )?;
        log::debug!("framebuffer {id:?} {width}x{height}");
        Ok(Self {
            id,
            colour: Texture::from_raw(colour, width, height),
            quad,
            program,
        })
    }

    /// Render into this target.
    pub fn bind(&self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        ctx.bind_framebuffer(Some(self.id))
    }

    /// Render to the screen again.
    pub fn unbind(&self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        ctx.bind_framebuffer(None)
    }

    /// Point the pass-through program at texture slot 0.
    pub fn update(&self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        ctx.use_program(self.program)?;
        ctx.set_uniform("u_DiffuseMap", Uniform::Int(0))
    }

    /// Draw the colour attachment over the whole bound target.
    pub fn draw(&self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        ctx.use_program(self.program)?;
        self.colour.bind(ctx, 0)?;
        self.quad.draw(ctx)
    }

    /// Recreate the target at a new size and free the old one. A no-op when
    /// the size is unchanged.
    pub fn resize(&mut self, ctx: &mut dyn GraphicsContext, width: u32, height: u32) -> Result<()> {
        if (width, height) == self.size() {
            return Ok(());
        }
        let (id, colour) = ctx.create_framebuffer(width, height)?;
        let old = std::mem::replace(&mut self.id, id);
        self.colour = Texture::from_raw(colour, width, height);
        ctx.destroy_framebuffer(old)
    }

    pub fn release(self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        // the colour attachment goes with the target
        ctx.destroy_framebuffer(self.id)?;
        self.quad.release(ctx)
    }

    pub fn id(&self) -> FramebufferId {
        self.id
    }

    pub fn colour(&self) -> &Texture {
        &self.colour
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn size(&self) -> (u32, u32) {
        (self.colour.width(), self.colour.height())
    }
}

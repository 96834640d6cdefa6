//! The graphics context: every GPU side effect of the engine goes through here.
//!
//! Instead of ambient "currently bound" global state, the state machine lives in
//! an explicit [`GraphicsContext`] value that is passed by reference to every
//! bind and draw call. Only one program, framebuffer and texture per slot is
//! active at a time, exactly like the GL model, but ownership is visible in the
//! signatures.
//!
//! Meshes, textures and framebuffers are released explicitly with the
//! `destroy_*` calls. Their handles are generational, so a handle that
//! outlives its resource is reported as [`SceneError::StaleHandle`] instead of
//! aliasing whatever reuses the slot.
//!
//! [`SceneError::StaleHandle`]: crate::error::SceneError::StaleHandle
//!
//! - [`RecordingContext`] validates calls and records them; it needs no GPU.
//! - `WgpuContext` (feature `gpu`) replays the same calls into wgpu render passes.

use slotmap::new_key_type;

use crate::{
    data_structures::layout::VertexBufferLayout,
    error::Result,
    resources::Image,
    shader::ShaderSource,
};

pub use crate::shader::reflect::Uniform;

#[cfg(feature = "gpu")]
pub mod gpu;
pub mod recording;

#[cfg(feature = "gpu")]
pub use gpu::WgpuContext;
pub use recording::{Command, DrawCall, RecordingContext};

/// A compiled shader program. Programs live as long as their context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(u32);

impl ProgramId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

new_key_type! {
    /// Uploaded vertex and index buffers.
    pub struct MeshId;
    pub struct TextureId;
    /// An off-screen colour + depth target.
    pub struct FramebufferId;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    #[default]
    Fill,
    /// Wireframe
    Line,
}

pub trait GraphicsContext {
    /// Compile a program. Its uniforms are the members of the module's `struct Uniforms`.
    fn create_program(&mut self, label: &str, source: &ShaderSource) -> Result<ProgramId>;

    fn use_program(&mut self, program: ProgramId) -> Result<()>;

    /// Set a uniform on the bound program. Fails with `ShaderUniformNotFound` when
    /// the program has no uniform with that name and type.
    fn set_uniform(&mut self, name: &str, value: Uniform) -> Result<()>;

    /// Upload interleaved vertices. `vertices` must be a whole number of `layout` strides.
    fn create_mesh(
        &mut self,
        label: &str,
        layout: &VertexBufferLayout,
        vertices: &[f32],
        indices: &[u32],
    ) -> Result<MeshId>;

    fn create_texture(&mut self, label: &str, image: &Image) -> Result<TextureId>;

    fn bind_texture(&mut self, slot: u32, texture: TextureId) -> Result<()>;

    /// Create an off-screen target and return it with its colour attachment.
    fn create_framebuffer(&mut self, width: u32, height: u32) -> Result<(FramebufferId, TextureId)>;

    fn destroy_mesh(&mut self, mesh: MeshId) -> Result<()>;

    /// Framebuffer colour attachments are released with their framebuffer only.
    fn destroy_texture(&mut self, texture: TextureId) -> Result<()>;

    /// Release the target, its depth buffer and its colour attachment.
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) -> Result<()>;

    /// `None` targets the screen.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> Result<()>;

    /// Clear colour and depth of the bound target.
    fn clear(&mut self, colour: [f32; 4]);

    fn set_polygon_mode(&mut self, mode: PolygonMode);

    fn set_depth_test(&mut self, enabled: bool);

    /// Draw `mesh` with the bound program, uniforms and textures.
    fn draw_indexed(&mut self, mesh: MeshId) -> Result<()>;

    /// Finish the frame and show it.
    fn present(&mut self) -> Result<()>;
}

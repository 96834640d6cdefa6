//! A headless [`GraphicsContext`] that validates every call and keeps a log of it.

use std::sync::Arc;

use slotmap::{Key, SlotMap};

use crate::{
    data_structures::layout::{LayoutKind, VertexBufferLayout},
    error::{Result, SceneError},
    resources::Image,
    shader::{
        ShaderSource,
        reflect::{UniformBlock, UniformLayout},
    },
};

use super::{FramebufferId, GraphicsContext, MeshId, PolygonMode, ProgramId, TextureId, Uniform};

/// One draw with everything that was bound when it was issued.
#[derive(Clone, Debug)]
pub struct DrawCall {
    pub program: ProgramId,
    pub mesh: MeshId,
    pub index_count: u32,
    /// Bound textures by slot, ascending.
    pub textures: Vec<(u32, TextureId)>,
    pub target: Option<FramebufferId>,
    pub polygon_mode: PolygonMode,
    pub depth_test: bool,
    pub uniforms: UniformBlock,
}

impl DrawCall {
    pub fn uniform(&self, name: &str) -> Option<Uniform> {
        self.uniforms.get(name)
    }

    pub fn texture(&self, slot: u32) -> Option<TextureId> {
        self.textures
            .iter()
            .find_map(|&(s, texture)| (s == slot).then_some(texture))
    }
}

#[derive(Clone, Debug)]
pub enum Command {
    UseProgram(ProgramId),
    SetUniform(String, Uniform),
    BindTexture(u32, TextureId),
    BindFramebuffer(Option<FramebufferId>),
    Clear([f32; 4]),
    PolygonMode(PolygonMode),
    DepthTest(bool),
    DrawIndexed(DrawCall),
    Present,
}

#[derive(Debug)]
pub(crate) struct ProgramState {
    pub(crate) label: String,
    pub(crate) uniforms: UniformBlock,
}

#[derive(Debug)]
pub(crate) struct MeshInfo {
    pub(crate) layout: LayoutKind,
    pub(crate) vertex_count: usize,
    pub(crate) index_count: u32,
}

/// GL-style bind state shared by both contexts.
#[derive(Debug, Default)]
pub(crate) struct BindState {
    pub(crate) program: Option<ProgramId>,
    pub(crate) textures: Vec<(u32, TextureId)>,
    pub(crate) target: Option<FramebufferId>,
    pub(crate) polygon_mode: PolygonMode,
    pub(crate) depth_test: bool,
}

impl BindState {
    pub(crate) fn bind_texture(&mut self, slot: u32, texture: TextureId) {
        match self.textures.iter_mut().find(|(s, _)| *s == slot) {
            Some(entry) => entry.1 = texture,
            None => {
                self.textures.push((slot, texture));
                self.textures.sort_unstable_by_key(|(s, _)| *s);
            }
        }
    }

    /// Forget bindings of a destroyed texture.
    pub(crate) fn unbind_texture(&mut self, texture: TextureId) {
        self.textures.retain(|&(_, t)| t != texture);
    }

    /// Fall back to the screen when the bound target is destroyed.
    pub(crate) fn unbind_target(&mut self, framebuffer: FramebufferId) {
        if self.target == Some(framebuffer) {
            self.target = None;
        }
    }
}

/// Validate a uniform write against the bound program.
pub(crate) fn write_uniform(
    programs: &mut [ProgramState],
    bound: Option<ProgramId>,
    name: &str,
    value: Uniform,
) -> Result<()> {
    let Some(state) = bound.and_then(|p| programs.get_mut(p.index())) else {
        return Err(SceneError::ShaderUniformNotFound {
            program: "<none>".to_string(),
            uniform: name.to_string(),
        });
    };
    if state.uniforms.set(name, value) {
        Ok(())
    } else {
        Err(SceneError::ShaderUniformNotFound {
            program: state.label.clone(),
            uniform: name.to_string(),
        })
    }
}

/// Look up a live resource.
pub(crate) fn lookup<'a, K: Key, V>(what: &'static str, items: &'a SlotMap<K, V>, key: K) -> Result<&'a V> {
    items.get(key).ok_or(SceneError::StaleHandle(what))
}

/// Check that every index refers to a vertex.
pub(crate) fn validate_mesh(
    layout: &VertexBufferLayout,
    vertices: &[f32],
    indices: &[u32],
) -> Result<usize> {
    let vertex_count = layout.validate(vertices)?;
    if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(SceneError::out_of_range("vertex", bad as usize, vertex_count));
    }
    Ok(vertex_count)
}

/// Records commands instead of talking to a GPU.
///
/// ```
/// use scene_ngin::context::{GraphicsContext, RecordingContext};
///
/// let mut ctx = RecordingContext::new();
/// ctx.clear([0.0, 0.0, 0.0, 1.0]);
/// assert_eq!(ctx.commands().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct RecordingContext {
    programs: Vec<ProgramState>,
    meshes: SlotMap<MeshId, MeshInfo>,
    textures: SlotMap<TextureId, (u32, u32)>,
    framebuffers: SlotMap<FramebufferId, TextureId>,
    state: BindState,
    commands: Vec<Command>,
    frames: u64,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Drain the log, e.g. between frames.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn draw_calls(&self) -> impl Iterator<Item = &DrawCall> {
        self.commands.iter().filter_map(|c| match c {
            Command::DrawIndexed(draw) => Some(draw),
            _ => None,
        })
    }

    /// Current value of a program's uniform.
    pub fn uniform(&self, program: ProgramId, name: &str) -> Option<Uniform> {
        self.programs.get(program.index())?.uniforms.get(name)
    }

    pub fn program_layout(&self, program: ProgramId) -> Option<&UniformLayout> {
        self.programs
            .get(program.index())
            .map(|p| p.uniforms.layout())
    }

    pub fn bound_program(&self) -> Option<ProgramId> {
        self.state.program
    }

    pub fn polygon_mode(&self) -> PolygonMode {
        self.state.polygon_mode
    }

    pub fn depth_test(&self) -> bool {
        self.state.depth_test
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures.get(texture).copied()
    }

    pub fn mesh_layout(&self, mesh: MeshId) -> Option<LayoutKind> {
        self.meshes.get(mesh).map(|m| m.layout)
    }

    pub fn mesh_vertex_count(&self, mesh: MeshId) -> Option<usize> {
        self.meshes.get(mesh).map(|m| m.vertex_count)
    }

    /// Live meshes.
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Live textures, framebuffer colour attachments included.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Live framebuffers.
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Number of presented frames.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn check<T>(what: &'static str, index: usize, items: &[T]) -> Result<()> {
        if index < items.len() {
            Ok(())
        } else {
            Err(SceneError::out_of_range(what, index, items.len()))
        }
    }
}

impl GraphicsContext for RecordingContext {
    fn create_program(&mut self, label: &str, source: &ShaderSource) -> Result<ProgramId> {
        let id = ProgramId::new(self.programs.len() as u32);
        self.programs.push(ProgramState {
            label: label.to_string(),
            uniforms: UniformBlock::new(Arc::clone(source.uniforms())),
        });
        Ok(id)
    }

    fn use_program(&mut self, program: ProgramId) -> Result<()> {
        Self::check("program", program.index(), &self.programs)?;
        self.state.program = Some(program);
        self.commands.push(Command::UseProgram(program));
        Ok(())
    }

    fn set_uniform(&mut self, name: &str, value: Uniform) -> Result<()> {
        write_uniform(&mut self.programs, self.state.program, name, value)?;
        self.commands
            .push(Command::SetUniform(name.to_string(), value));
        Ok(())
    }

    fn create_mesh(
        &mut self,
        label: &str,
        layout: &VertexBufferLayout,
        vertices: &[f32],
        indices: &[u32],
    ) -> Result<MeshId> {
        let vertex_count = validate_mesh(layout, vertices, indices)?;
        log::debug!("mesh `{label}`: {vertex_count} vertices, {} indices", indices.len());
        Ok(self.meshes.insert(MeshInfo {
            layout: layout.kind(),
            vertex_count,
            index_count: indices.len() as u32,
        }))
    }

    fn create_texture(&mut self, label: &str, image: &Image) -> Result<TextureId> {
        log::debug!("texture `{label}`: {}x{}", image.width(), image.height());
        Ok(self.textures.insert((image.width(), image.height())))
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureId) -> Result<()> {
        lookup("texture", &self.textures, texture)?;
        self.state.bind_texture(slot, texture);
        self.commands.push(Command::BindTexture(slot, texture));
        Ok(())
    }

    fn create_framebuffer(&mut self, width: u32, height: u32) -> Result<(FramebufferId, TextureId)> {
        let colour = self.textures.insert((width, height));
        Ok((self.framebuffers.insert(colour), colour))
    }

    fn destroy_mesh(&mut self, mesh: MeshId) -> Result<()> {
        self.meshes
            .remove(mesh)
            .ok_or(SceneError::StaleHandle("mesh"))?;
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) -> Result<()> {
        if self.framebuffers.values().any(|&colour| colour == texture) {
            return Err(SceneError::Backend(
                "a framebuffer colour attachment is released with its framebuffer".into(),
            ));
        }
        self.textures
            .remove(texture)
            .ok_or(SceneError::StaleHandle("texture"))?;
        self.state.unbind_texture(texture);
        Ok(())
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) -> Result<()> {
        let colour = self
            .framebuffers
            .remove(framebuffer)
            .ok_or(SceneError::StaleHandle("framebuffer"))?;
        self.textures.remove(colour);
        self.state.unbind_texture(colour);
        self.state.unbind_target(framebuffer);
        Ok(())
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> Result<()> {
        if let Some(fb) = framebuffer {
            lookup("framebuffer", &self.framebuffers, fb)?;
        }
        self.state.target = framebuffer;
        self.commands.push(Command::BindFramebuffer(framebuffer));
        Ok(())
    }

    fn clear(&mut self, colour: [f32; 4]) {
        self.commands.push(Command::Clear(colour));
    }

    fn set_polygon_mode(&mut self, mode: PolygonMode) {
        self.state.polygon_mode = mode;
        self.commands.push(Command::PolygonMode(mode));
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.state.depth_test = enabled;
        self.commands.push(Command::DepthTest(enabled));
    }

    fn draw_indexed(&mut self, mesh: MeshId) -> Result<()> {
        let index_count = lookup("mesh", &self.meshes, mesh)?.index_count;
        let Some(program) = self.state.program else {
            return Err(SceneError::Backend("draw without a bound program".into()));
        };
        let draw = DrawCall {
            program,
            mesh,
            index_count,
            textures: self.state.textures.clone(),
            target: self.state.target,
            polygon_mode: self.state.polygon_mode,
            depth_test: self.state.depth_test,
            uniforms: self.programs[program.index()].uniforms.clone(),
        };
        self.commands.push(Command::DrawIndexed(draw));
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.frames += 1;
        self.commands.push(Command::Present);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Matrix4, SquareMatrix};

    use super::*;

    fn program(ctx: &mut RecordingContext) -> ProgramId {
        let source = ShaderSource::new(
            "test",
            "struct Uniforms { model: mat4x4<f32>, u_DiffuseMap: i32 }",
        )
        .unwrap();
        ctx.create_program("test", &source).unwrap()
    }

    #[test]
    fn unknown_uniform_is_reported_with_the_program_label() {
        let mut ctx = RecordingContext::new();
        let p = program(&mut ctx);
        ctx.use_program(p).unwrap();
        let err = ctx.set_uniform("u_Missing", Uniform::Int(0)).unwrap_err();
        match err {
            SceneError::ShaderUniformNotFound { program, uniform } => {
                assert_eq!(program, "test");
                assert_eq!(uniform, "u_Missing");
            }
            other => panic!("unexpected {other}"),
        }
        // wrong type is the same as no such uniform
        assert!(ctx.set_uniform("u_DiffuseMap", Uniform::Float(0.0)).is_err());
    }

    #[test]
    fn uniforms_need_a_bound_program() {
        let mut ctx = RecordingContext::new();
        program(&mut ctx);
        assert!(matches!(
            ctx.set_uniform("model", Matrix4::<f32>::identity().into()),
            Err(SceneError::ShaderUniformNotFound { program, .. }) if program == "<none>"
        ));
    }

    #[test]
    fn uniform_state_persists_per_program() {
        let mut ctx = RecordingContext::new();
        let a = program(&mut ctx);
        let b = program(&mut ctx);
        ctx.use_program(a).unwrap();
        ctx.set_uniform("u_DiffuseMap", Uniform::Int(3)).unwrap();
        ctx.use_program(b).unwrap();
        ctx.use_program(a).unwrap();
        assert_eq!(ctx.uniform(a, "u_DiffuseMap"), Some(Uniform::Int(3)));
        assert_eq!(ctx.uniform(b, "u_DiffuseMap"), Some(Uniform::Int(0)));
    }

    #[test]
    fn meshes_are_validated() {
        let mut ctx = RecordingContext::new();
        let layout = VertexBufferLayout::textured();
        assert!(matches!(
            ctx.create_mesh("bad", &layout, &[0.0; 7], &[0]),
            Err(SceneError::LayoutMismatch { .. })
        ));
        assert!(matches!(
            ctx.create_mesh("bad", &layout, &[0.0; 10], &[0, 1, 2]),
            Err(SceneError::IndexOutOfRange { index: 2, len: 2, .. })
        ));
        let mesh = ctx.create_mesh("ok", &layout, &[0.0; 15], &[0, 1, 2]).unwrap();
        assert_eq!(ctx.mesh_vertex_count(mesh), Some(3));
        assert_eq!(ctx.mesh_layout(mesh), Some(LayoutKind::Textured));
    }

    #[test]
    fn draw_snapshots_bound_state() {
        let mut ctx = RecordingContext::new();
        let p = program(&mut ctx);
        let layout = VertexBufferLayout::positions();
        let mesh = ctx.create_mesh("tri", &layout, &[0.0; 9], &[0, 1, 2]).unwrap();
        let texture = ctx.create_texture("white", &Image::filled(1, 1, [255; 3])).unwrap();
        let (fb, colour) = ctx.create_framebuffer(4, 4).unwrap();

        ctx.bind_framebuffer(Some(fb)).unwrap();
        ctx.use_program(p).unwrap();
        ctx.bind_texture(1, colour).unwrap();
        ctx.bind_texture(0, texture).unwrap();
        ctx.set_polygon_mode(PolygonMode::Line);
        ctx.set_depth_test(true);
        ctx.set_uniform("u_DiffuseMap", Uniform::Int(1)).unwrap();
        ctx.draw_indexed(mesh).unwrap();
        ctx.set_uniform("u_DiffuseMap", Uniform::Int(2)).unwrap();

        let draw = ctx.draw_calls().next().unwrap();
        assert_eq!(draw.index_count, 3);
        assert_eq!(draw.target, Some(fb));
        assert_eq!(draw.textures, vec![(0, texture), (1, colour)]);
        assert_eq!(draw.texture(1), Some(colour));
        assert_eq!(draw.polygon_mode, PolygonMode::Line);
        assert!(draw.depth_test);
        assert_eq!(draw.uniform("u_DiffuseMap"), Some(Uniform::Int(1)));
    }

    #[test]
    fn unknown_handles_are_rejected() {
        let mut ctx = RecordingContext::new();
        assert!(matches!(
            ctx.use_program(ProgramId::new(0)),
            Err(SceneError::IndexOutOfRange { what: "program", .. })
        ));
        assert!(matches!(
            ctx.bind_texture(0, TextureId::default()),
            Err(SceneError::StaleHandle("texture"))
        ));
        assert!(ctx.bind_framebuffer(Some(FramebufferId::default())).is_err());
        assert!(ctx.bind_framebuffer(None).is_ok());
        assert!(ctx.draw_indexed(MeshId::default()).is_err());
    }

    #[test]
    fn destroyed_handles_stay_invalid_after_slot_reuse() {
        let mut ctx = RecordingContext::new();
        let p = program(&mut ctx);
        ctx.use_program(p).unwrap();
        let layout = VertexBufferLayout::positions();
        let old = ctx.create_mesh("a", &layout, &[0.0; 9], &[0, 1, 2]).unwrap();
        ctx.destroy_mesh(old).unwrap();
        let new = ctx.create_mesh("b", &layout, &[0.0; 9], &[0, 1, 2]).unwrap();

        assert_eq!(ctx.mesh_count(), 1);
        assert_ne!(old, new);
        assert!(matches!(ctx.draw_indexed(old), Err(SceneError::StaleHandle("mesh"))));
        assert!(ctx.destroy_mesh(old).is_err());
        assert!(ctx.draw_indexed(new).is_ok());
    }

    #[test]
    fn destroying_a_framebuffer_frees_its_attachment_and_unbinds_it() {
        let mut ctx = RecordingContext::new();
        let (fb, colour) = ctx.create_framebuffer(8, 8).unwrap();
        ctx.bind_framebuffer(Some(fb)).unwrap();
        ctx.bind_texture(0, colour).unwrap();
        assert!(ctx.destroy_texture(colour).is_err());

        ctx.destroy_framebuffer(fb).unwrap();
        assert_eq!(ctx.framebuffer_count(), 0);
        assert_eq!(ctx.texture_count(), 0);
        assert_eq!(ctx.texture_size(colour), None);

        let p = program(&mut ctx);
        ctx.use_program(p).unwrap();
        let mesh = ctx
            .create_mesh("tri", &VertexBufferLayout::positions(), &[0.0; 9], &[0, 1, 2])
            .unwrap();
        ctx.draw_indexed(mesh).unwrap();
        let draw = ctx.draw_calls().next().unwrap();
        assert_eq!(draw.target, None);
        assert!(draw.textures.is_empty());
    }

    #[test]
    fn destroyed_textures_are_unbound() {
        let mut ctx = RecordingContext::new();
        let texture = ctx.create_texture("t", &Image::new(1, 1)).unwrap();
        ctx.bind_texture(0, texture).unwrap();
        ctx.destroy_texture(texture).unwrap();
        assert!(ctx.bind_texture(0, texture).is_err());
        assert_eq!(ctx.texture_count(), 0);
    }

    #[test]
    fn present_counts_frames_and_take_drains() {
        let mut ctx = RecordingContext::new();
        ctx.clear([0.0; 4]);
        ctx.present().unwrap();
        assert_eq!(ctx.frames(), 1);
        assert_eq!(ctx.take_commands().len(), 2);
        assert!(ctx.commands().is_empty());
    }
}

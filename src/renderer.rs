//! Per-frame driver: cameras, the scene root, lights and the optional off-screen pass.

use crate::{
    camera::{Camera, Projection},
    config::EngineConfig,
    context::{GraphicsContext, PolygonMode, ProgramId},
    data_structures::{
        framebuffer::Framebuffer,
        scene_graph::{FrameUniforms, NodeId, SceneGraph},
    },
    error::{Result, SceneError},
    light::PointLight,
};

/// Where the renderer is within [`Renderer::frame`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameState {
    #[default]
    Idle,
    Update,
    Render,
    Swap,
}

#[derive(Debug)]
pub struct Renderer {
    cameras: Vec<Camera>,
    scene: SceneGraph,
    root: Option<NodeId>,
    framebuffer: Option<Framebuffer>,
    projection: Projection,
    lights: Vec<PointLight>,
    wireframe: bool,
    clear_colour: [f32; 4],
    composite_clear_colour: [f32; 4],
    state: FrameState,
    frames: u64,
}

impl Renderer {
    /// `framebuffer_program` enables the off-screen pass when the config asks for it.
    pub fn new(
        ctx: &mut dyn GraphicsContext,
        width: u32,
        height: u32,
        config: &EngineConfig,
        framebuffer_program: Option<ProgramId>,
    ) -> Result<Self> {
        let framebuffer = match (config.render.offscreen, framebuffer_program) {
            (true, Some(program)) => Some(Framebuffer::new(ctx, program, width, height)?),
            (true, None) => {
                log::warn!("off-screen pass requested without a framebuffer program, rendering directly");
                None
            }
            (false, _) => None,
        };
        Ok(Self {
            cameras: vec![Camera::from_config(&config.camera)],
            scene: SceneGraph::new(),
            root: None,
            framebuffer,
            projection: Projection::from_config(width, height, &config.projection),
            lights: PointLight::defaults(),
            wireframe: config.render.wireframe,
            clear_colour: config.render.clear_colour,
            composite_clear_colour: config.render.composite_clear_colour,
            state: FrameState::Idle,
            frames: 0,
        })
    }

    pub fn set_root(&mut self, root: NodeId) -> Result<()> {
        if !self.scene.contains(root) {
            return Err(SceneError::UnknownNode);
        }
        self.root = Some(root);
        Ok(())
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut SceneGraph {
        &mut self.scene
    }

    pub fn camera(&self, index: usize) -> Result<&Camera> {
        let len = self.cameras.len();
        self.cameras
            .get(index)
            .ok_or(SceneError::out_of_range("camera", index, len))
    }

    pub fn camera_mut(&mut self, index: usize) -> Result<&mut Camera> {
        let len = self.cameras.len();
        self.cameras
            .get_mut(index)
            .ok_or(SceneError::out_of_range("camera", index, len))
    }

    /// Returns the index of the new camera. Camera 0 is the one that renders.
    pub fn add_camera(&mut self, camera: Camera) -> usize {
        self.cameras.push(camera);
        self.cameras.len() - 1
    }

    pub fn lights(&self) -> &[PointLight] {
        &self.lights
    }

    pub fn set_lights(&mut self, lights: Vec<PointLight>) {
        self.lights = lights;
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn framebuffer(&self) -> Option<&Framebuffer> {
        self.framebuffer.as_ref()
    }

    pub fn toggle_wireframe(&mut self) {
        self.wireframe = !self.wireframe;
    }

    pub fn set_wireframe(&mut self, wireframe: bool) {
        self.wireframe = wireframe;
    }

    pub fn is_wireframe(&self) -> bool {
        self.wireframe
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Completed frames.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn resize(&mut self, ctx: &mut dyn GraphicsContext, width: u32, height: u32) -> Result<()> {
        self.projection.resize(width, height);
        if let Some(framebuffer) = &mut self.framebuffer {
            framebuffer.resize(ctx, width, height)?;
        }
        Ok(())
    }

    /// Release the scene's drawables and the off-screen target.
    pub fn release(mut self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        let scene = self.scene.clear(ctx);
        let framebuffer = match self.framebuffer.take() {
            Some(framebuffer) => framebuffer.release(ctx),
            None => Ok(()),
        };
        scene.and(framebuffer)
    }

    /// Push transforms, camera and lights into the scene's programs.
    pub fn update(&mut self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        let Some(root) = self.root else {
            return Ok(());
        };
        let frame = FrameUniforms {
            projection: self.projection.calc_matrix(),
            camera: &self.cameras[0],
            lights: &self.lights,
        };
        self.scene.update(root, ctx, &frame)
    }

    pub fn render(&self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        if let Some(framebuffer) = &self.framebuffer {
            framebuffer.update(ctx)?;
            framebuffer.bind(ctx)?;
        }
        ctx.set_depth_test(true);
        ctx.clear(self.clear_colour);
        ctx.set_polygon_mode(if self.wireframe {
            PolygonMode::Line
        } else {
            PolygonMode::Fill
        });
        if let Some(root) = self.root {
            self.scene.draw(root, ctx)?;
        }
        if let Some(framebuffer) = &self.framebuffer {
            framebuffer.unbind(ctx)?;
            ctx.set_polygon_mode(PolygonMode::Fill);
            ctx.set_depth_test(false);
            ctx.clear(self.composite_clear_colour);
            framebuffer.draw(ctx)?;
        }
        Ok(())
    }

    /// Update, render and present one frame.
    pub fn frame(&mut self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        let result = self.run_frame(ctx);
        self.state = FrameState::Idle;
        if result.is_ok() {
            self.frames += 1;
        }
        result
    }

    fn run_frame(&mut self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        self.state = FrameState::Update;
        self.update(ctx)?;
        self.state = FrameState::Render;
        self.render(ctx)?;
        self.state = FrameState::Swap;
        ctx.present()
    }
}

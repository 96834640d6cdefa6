//! Application event loop.
//!
//! A [`SceneFlow`] builds its scene once the window and graphics context exist
//! and then gets a callback per frame and per window event. The loop owns
//! everything else:
//!
//! 1. create the window, the [`WgpuContext`], the [`ShaderRegistry`] and the [`Renderer`]
//! 2. load the scene and framebuffer shaders named in the config
//! 3. call [`SceneFlow::on_init`]
//! 4. per event: cursor motion feeds mouse look, keys feed the camera controller,
//!    `W` toggles wireframe and `Escape` quits
//! 5. per redraw: move the camera, call [`SceneFlow::on_update`] and render one frame
//! 6. on exit: release the scene and framebuffer GPU resources

use std::sync::Arc;

use instant::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

use crate::{
    camera::CameraController,
    config::EngineConfig,
    context::{GraphicsContext, WgpuContext},
    error::Result,
    renderer::Renderer,
    shader::ShaderRegistry,
};

/// Registry name of the shader loaded from `config.shaders.scene`.
pub const SCENE_SHADER: &str = "scene";
/// Registry name of the shader loaded from `config.shaders.framebuffer`.
pub const FRAMEBUFFER_SHADER: &str = "framebuffer";

/// A scene driven by [`run`].
pub trait SceneFlow {
    /// Build the scene graph and set the renderer's root.
    ///
    /// The shaders from the config are already registered under
    /// [`SCENE_SHADER`] and [`FRAMEBUFFER_SHADER`] when they loaded.
    fn on_init(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        shaders: &mut ShaderRegistry,
        renderer: &mut Renderer,
    ) -> Result<()>;

    /// Called every frame before rendering.
    fn on_update(&mut self, _renderer: &mut Renderer, _dt: Duration) {}

    /// Called for every window event after the built-in handling.
    fn on_window_events(&mut self, _renderer: &mut Renderer, _event: &WindowEvent) {}
}

struct AppState {
    ctx: WgpuContext,
    renderer: Renderer,
    controller: CameraController,
}

struct App<F: SceneFlow> {
    config: EngineConfig,
    flow: F,
    state: Option<AppState>,
    last_time: Instant,
    error: Option<anyhow::Error>,
}

impl<F: SceneFlow> App<F> {
    fn new(config: EngineConfig, flow: F) -> Self {
        Self {
            config,
            flow,
            state: None,
            last_time: Instant::now(),
            error: None,
        }
    }

    fn init(&mut self, window: Arc<Window>) -> anyhow::Result<AppState> {
        let size = window.inner_size();
        let mut ctx = futures::executor::block_on(WgpuContext::new(window))?;
        let mut shaders = ShaderRegistry::new();
        shaders.load_or_warn(&mut ctx, SCENE_SHADER, &self.config.shaders.scene);
        let framebuffer =
            shaders.load_or_warn(&mut ctx, FRAMEBUFFER_SHADER, &self.config.shaders.framebuffer);
        let mut renderer = Renderer::new(
            &mut ctx,
            size.width.max(1),
            size.height.max(1),
            &self.config,
            framebuffer,
        )?;
        self.flow.on_init(&mut ctx, &mut shaders, &mut renderer)?;
        log::info!(
            "scene ready: {} nodes, shaders {:?}",
            renderer.scene().len(),
            shaders.names()
        );
        Ok(AppState {
            ctx,
            renderer,
            controller: CameraController::new(self.config.camera.speed),
        })
    }
}

impl<F: SceneFlow> ApplicationHandler for App<F> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        let window_attributes = Window::default_attributes()
            .with_title(self.config.window.title.clone())
            .with_inner_size(PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));
        let state = event_loop
            .create_window(window_attributes)
            .map_err(anyhow::Error::from)
            .and_then(|window| self.init(Arc::new(window)));
        match state {
            Ok(state) => {
                state.ctx.window().request_redraw();
                self.last_time = Instant::now();
                self.state = Some(state);
            }
            Err(e) => {
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let state = match &mut self.state {
            Some(state) => state,
            None => return,
        };

        state.controller.handle_window_events(&event);
        self.flow.on_window_events(&mut state.renderer, &event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                state.ctx.resize(size.width, size.height);
                if size.width > 0 && size.height > 0 {
                    if let Err(e) = state
                        .renderer
                        .resize(&mut state.ctx, size.width, size.height)
                    {
                        log::error!("Unable to resize {}", e);
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Ok(camera) = state.renderer.camera_mut(0) {
                    camera.mouse_look(position.x as f32, position.y as f32);
                }
            }
            WindowEvent::CursorLeft { .. } | WindowEvent::Focused(false) => {
                if let Ok(camera) = state.renderer.camera_mut(0) {
                    camera.reset_mouse();
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match code {
                KeyCode::Escape => event_loop.exit(),
                KeyCode::KeyW => {
                    state.renderer.toggle_wireframe();
                    log::debug!("wireframe {}", state.renderer.is_wireframe());
                }
                _ => {}
            },
            WindowEvent::RedrawRequested => {
                let dt = self.last_time.elapsed();
                self.last_time = Instant::now();

                if let Ok(camera) = state.renderer.camera_mut(0) {
                    state.controller.update_camera(camera);
                }
                self.flow.on_update(&mut state.renderer, dt);
                if let Err(e) = state.renderer.frame(&mut state.ctx) {
                    log::error!("Unable to render {}", e);
                }
                state.ctx.window().request_redraw();
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(AppState {
            mut ctx, renderer, ..
        }) = self.state.take()
        {
            if let Err(e) = renderer.release(&mut ctx) {
                log::warn!("Unable to release scene resources {}", e);
            }
        }
    }
}

/// Open a window and drive `flow` until it is closed.
pub fn run<F: SceneFlow>(config: EngineConfig, flow: F) -> anyhow::Result<()> {
    if let Err(e) = env_logger::try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    };

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config, flow);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

//! wgpu implementation of [`GraphicsContext`].
//!
//! Calls are validated and recorded exactly like the headless context does.
//! On [`present`](GraphicsContext::present) the recorded frame is replayed:
//!
//! - every draw's uniform snapshot is packed into one buffer at aligned dynamic offsets
//! - consecutive draws into the same target share a render pass, a clear starts a new one
//! - pipelines are built lazily per program, vertex layout, polygon mode and depth state
//!
//! Bind group 0 is the program's `Uniforms` block, bind group 1 holds two
//! texture/sampler pairs (slots 0 and 1).
//!
//! Shader and pipeline creation run inside validation error scopes, so bad
//! WGSL surfaces as [`SceneError::ResourceLoad`] instead of a device panic.

use std::{collections::HashMap, iter, num::NonZeroU64, sync::Arc};

use slotmap::SlotMap;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    data_structures::layout::{LayoutKind, VertexBufferLayout},
    error::{Result, SceneError},
    resources::Image,
    shader::{FRAGMENT_ENTRY, ShaderSource, VERTEX_ENTRY, reflect::UniformBlock},
};

use super::{
    FramebufferId, GraphicsContext, MeshId, PolygonMode, ProgramId, TextureId, Uniform,
    recording::{BindState, ProgramState, lookup, validate_mesh, write_uniform},
};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const TEXTURE_SLOTS: u32 = 2;

struct GpuMesh {
    layout: VertexBufferLayout,
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

struct GpuTexture {
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

struct GpuFramebuffer {
    colour: TextureId,
    depth: wgpu::TextureView,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    layout: LayoutKind,
    polygon_mode: PolygonMode,
    depth_test: bool,
}

struct DrawRecord {
    key: PipelineKey,
    mesh: MeshId,
    textures: [Option<TextureId>; TEXTURE_SLOTS as usize],
    uniform_offset: u32,
}

struct PassRecord {
    target: Option<FramebufferId>,
    clear: Option<[f32; 4]>,
    draws: Vec<usize>,
}

#[derive(Default)]
struct FrameRecord {
    uniforms: Vec<u8>,
    draws: Vec<DrawRecord>,
    passes: Vec<PassRecord>,
}

pub struct WgpuContext {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth: wgpu::TextureView,
    line_mode: bool,
    uniform_alignment: u32,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    white: GpuTexture,
    programs: Vec<ProgramState>,
    modules: Vec<wgpu::ShaderModule>,
    /// `None` marks a pipeline that failed validation and is not retried.
    pipelines: HashMap<PipelineKey, Option<wgpu::RenderPipeline>>,
    meshes: SlotMap<MeshId, GpuMesh>,
    textures: SlotMap<TextureId, GpuTexture>,
    framebuffers: SlotMap<FramebufferId, GpuFramebuffer>,
    state: BindState,
    frame: FrameRecord,
}

impl std::fmt::Debug for WgpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuContext")
            .field("size", &(self.config.width, self.config.height))
            .field("format", &self.config.format)
            .field("programs", &self.programs.len())
            .field("meshes", &self.meshes.len())
            .field("textures", &self.textures.len())
            .finish()
    }
}

fn backend(e: impl std::fmt::Display) -> SceneError {
    SceneError::Backend(e.to_string())
}

impl WgpuContext {
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();

        log::debug!("WGPU setup");
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });
        let surface = instance.create_surface(window.clone()).map_err(backend)?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(backend)?;

        let line_mode = adapter
            .features()
            .contains(wgpu::Features::POLYGON_MODE_LINE);
        if !line_mode {
            log::warn!("adapter has no line polygon mode, wireframe renders filled");
        }
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: if line_mode {
                    wgpu::Features::POLYGON_MODE_LINE
                } else {
                    wgpu::Features::empty()
                },
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
                ..Default::default()
            })
            .await
            .map_err(backend)?;
        // anything not caught by an error scope is logged instead of panicking
        device.on_uncaptured_error(Arc::new(|e| log::error!("wgpu: {e}")));

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| backend("surface supports no texture format"))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("uniforms_bind_group_layout"),
        });
        let texture_entries: Vec<_> = (0..TEXTURE_SLOTS)
            .flat_map(|slot| {
                [
                    wgpu::BindGroupLayoutEntry {
                        binding: slot * 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: slot * 2 + 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ]
            })
            .collect();
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &texture_entries,
            label: Some("texture_bind_group_layout"),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render Pipeline Layout"),
            bind_group_layouts: &[Some(&uniform_layout), Some(&texture_layout)],
            immediate_size: 0,
        });

        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment;
        let depth = create_depth_view(&device, config.width, config.height, "depth_texture");
        let white = upload_texture(&device, &queue, "white", &Image::filled(1, 1, [255; 3]), config.format);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            depth,
            line_mode,
            uniform_alignment,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            white,
            programs: Vec::new(),
            modules: Vec::new(),
            pipelines: HashMap::new(),
            meshes: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            state: BindState::default(),
            frame: FrameRecord::default(),
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Reconfigure the surface. Zero sizes (minimized windows) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth = create_depth_view(&self.device, width, height, "depth_texture");
    }

    fn check<T>(what: &'static str, index: usize, items: &[T]) -> Result<()> {
        if index < items.len() {
            Ok(())
        } else {
            Err(SceneError::out_of_range(what, index, items.len()))
        }
    }

    /// Index of the pass the next draw goes into.
    fn current_pass(&mut self) -> usize {
        let target = self.state.target;
        match self.frame.passes.last() {
            Some(pass) if pass.target == target => {}
            _ => self.frame.passes.push(PassRecord {
                target,
                clear: None,
                draws: Vec::new(),
            }),
        }
        self.frame.passes.len() - 1
    }

    fn push_uniforms(&mut self, block: &UniformBlock) -> u32 {
        let alignment = self.uniform_alignment.max(1) as usize;
        let offset = self.frame.uniforms.len().div_ceil(alignment) * alignment;
        self.frame.uniforms.resize(offset, 0);
        self.frame.uniforms.extend_from_slice(block.bytes());
        self.frame
            .uniforms
            .resize(offset + block.bytes().len().max(16), 0);
        offset as u32
    }

    /// Build the pipeline for `key` unless it was tried before.
    fn ensure_pipeline(&mut self, key: PipelineKey) -> Result<()> {
        if self.pipelines.contains_key(&key) {
            return Ok(());
        }
        let layout = match key.layout {
            LayoutKind::Positions => VertexBufferLayout::positions(),
            LayoutKind::Textured => VertexBufferLayout::textured(),
            LayoutKind::NormalMapped => VertexBufferLayout::normal_mapped(),
            LayoutKind::ScreenQuad => VertexBufferLayout::screen_quad(),
        };
        let attributes: Vec<_> = layout
            .attributes()
            .iter()
            .map(|a| wgpu::VertexAttribute {
                offset: (a.offset * std::mem::size_of::<f32>()) as wgpu::BufferAddress,
                shader_location: a.location,
                format: match a.components {
                    1 => wgpu::VertexFormat::Float32,
                    2 => wgpu::VertexFormat::Float32x2,
                    3 => wgpu::VertexFormat::Float32x3,
                    _ => wgpu::VertexFormat::Float32x4,
                },
            })
            .collect();
        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: layout.stride_in_bytes() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        };
        let polygon_mode = match key.polygon_mode {
            PolygonMode::Line if self.line_mode => wgpu::PolygonMode::Line,
            _ => wgpu::PolygonMode::Fill,
        };
        let module = &self.modules[key.program.index()];
        let label = format!("{} pipeline", self.programs[key.program.index()].label);
        let pipeline = validated(&self.device, &label, |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                cache: None,
                label: Some(&label),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some(VERTEX_ENTRY),
                    buffers: &[vertex_layout],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(FRAGMENT_ENTRY),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.config.format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: Some(key.depth_test),
                    depth_compare: Some(if key.depth_test {
                        wgpu::CompareFunction::Less
                    } else {
                        wgpu::CompareFunction::Always
                    }),
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview_mask: None,
            })
        });
        match pipeline {
            Ok(pipeline) => {
                log::debug!("built pipeline {key:?}");
                self.pipelines.insert(key, Some(pipeline));
                Ok(())
            }
            Err(e) => {
                self.pipelines.insert(key, None);
                Err(e)
            }
        }
    }

    fn texture_group(&self, textures: &[Option<TextureId>]) -> wgpu::BindGroup {
        let bound: Vec<&GpuTexture> = textures
            .iter()
            .map(|t| {
                t.and_then(|t| self.textures.get(t))
                    .unwrap_or(&self.white)
            })
            .collect();
        let entries: Vec<_> = bound
            .iter()
            .enumerate()
            .flat_map(|(slot, texture)| {
                let slot = slot as u32;
                [
                    wgpu::BindGroupEntry {
                        binding: slot * 2,
                        resource: wgpu::BindingResource::TextureView(&texture.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: slot * 2 + 1,
                        resource: wgpu::BindingResource::Sampler(&texture.sampler),
                    },
                ]
            })
            .collect();
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.texture_layout,
            entries: &entries,
            label: Some("texture_bind_group"),
        })
    }
}

impl GraphicsContext for WgpuContext {
    fn create_program(&mut self, label: &str, source: &ShaderSource) -> Result<ProgramId> {
        let module = validated(&self.device, label, |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.wgsl().into()),
            })
        })?;
        let id = ProgramId::new(self.programs.len() as u32);
        self.programs.push(ProgramState {
            label: label.to_string(),
            uniforms: UniformBlock::new(Arc::clone(source.uniforms())),
        });
        self.modules.push(module);
        Ok(id)
    }

    fn use_program(&mut self, program: ProgramId) -> Result<()> {
        Self::check("program", program.index(), &self.programs)?;
        self.state.program = Some(program);
        Ok(())
    }

    fn set_uniform(&mut self, name: &str, value: Uniform) -> Result<()> {
        write_uniform(&mut self.programs, self.state.program, name, value)
    }

    fn create_mesh(
        &mut self,
        label: &str,
        layout: &VertexBufferLayout,
        vertices: &[f32],
        indices: &[u32],
    ) -> Result<MeshId> {
        validate_mesh(layout, vertices, indices)?;
        let vertex = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Vertex Buffer")),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Index Buffer")),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Ok(self.meshes.insert(GpuMesh {
            layout: layout.clone(),
            vertex,
            index,
            index_count: indices.len() as u32,
        }))
    }

    fn create_texture(&mut self, label: &str, image: &Image) -> Result<TextureId> {
        let texture = upload_texture(&self.device, &self.queue, label, image, self.config.format);
        Ok(self.textures.insert(texture))
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureId) -> Result<()> {
        lookup("texture", &self.textures, texture)?;
        if slot >= TEXTURE_SLOTS {
            return Err(SceneError::out_of_range("texture slot", slot as usize, TEXTURE_SLOTS as usize));
        }
        self.state.bind_texture(slot, texture);
        Ok(())
    }

    fn create_framebuffer(&mut self, width: u32, height: u32) -> Result<(FramebufferId, TextureId)> {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("framebuffer colour"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.config.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let colour = self.textures.insert(GpuTexture {
            view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            sampler: create_sampler(&self.device, wgpu::AddressMode::ClampToEdge),
        });
        let id = self.framebuffers.insert(GpuFramebuffer {
            colour,
            depth: create_depth_view(&self.device, size.width, size.height, "framebuffer depth"),
        });
        Ok((id, colour))
    }

    // wgpu frees the underlying memory once recorded commands no longer use it

    fn destroy_mesh(&mut self, mesh: MeshId) -> Result<()> {
        self.meshes
            .remove(mesh)
            .ok_or(SceneError::StaleHandle("mesh"))?;
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) -> Result<()> {
        if self.framebuffers.values().any(|fb| fb.colour == texture) {
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
        let fb = self
            .framebuffers
            .remove(framebuffer)
            .ok_or(SceneError::StaleHandle("framebuffer"))?;
        self.textures.remove(fb.colour);
        self.state.unbind_texture(fb.colour);
        self.state.unbind_target(framebuffer);
        Ok(())
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> Result<()> {
        if let Some(fb) = framebuffer {
            lookup("framebuffer", &self.framebuffers, fb)?;
        }
        self.state.target = framebuffer;
        Ok(())
    }

    fn clear(&mut self, colour: [f32; 4]) {
        self.frame.passes.push(PassRecord {
            target: self.state.target,
            clear: Some(colour),
            draws: Vec::new(),
        });
    }

    fn set_polygon_mode(&mut self, mode: PolygonMode) {
        self.state.polygon_mode = mode;
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.state.depth_test = enabled;
    }

    fn draw_indexed(&mut self, mesh: MeshId) -> Result<()> {
        let layout = lookup("mesh", &self.meshes, mesh)?.layout.kind();
        let Some(program) = self.state.program else {
            return Err(SceneError::Backend("draw without a bound program".into()));
        };
        let key = PipelineKey {
            program,
            layout,
            polygon_mode: self.state.polygon_mode,
            depth_test: self.state.depth_test,
        };
        let mut textures = [None; TEXTURE_SLOTS as usize];
        for &(slot, texture) in &self.state.textures {
            if let Some(entry) = textures.get_mut(slot as usize) {
                *entry = Some(texture);
            }
        }
        let block = self.programs[program.index()].uniforms.clone();
        let uniform_offset = self.push_uniforms(&block);
        let pass = self.current_pass();
        let draw = self.frame.draws.len();
        self.frame.draws.push(DrawRecord {
            key,
            mesh,
            textures,
            uniform_offset,
        });
        self.frame.passes[pass].draws.push(draw);
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        let frame = std::mem::take(&mut self.frame);
        let output = match self.surface.get_current_texture() {
            wgpu::CurrentSurfaceTexture::Success(output) => output,
            wgpu::CurrentSurfaceTexture::Suboptimal(output) => {
                self.surface.configure(&self.device, &self.config);
                output
            }
            wgpu::CurrentSurfaceTexture::Outdated | wgpu::CurrentSurfaceTexture::Lost => {
                self.surface.configure(&self.device, &self.config);
                return Err(backend("surface outdated or lost, reconfigured"));
            }
            wgpu::CurrentSurfaceTexture::Timeout | wgpu::CurrentSurfaceTexture::Occluded => {
                return Err(backend("no surface texture this frame"));
            }
            wgpu::CurrentSurfaceTexture::Validation => {
                return Err(backend("surface texture failed validation"));
            }
        };
        let surface_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        // broken pipelines are skipped; the first failure is returned after presenting
        let mut pipeline_error = None;
        for draw in &frame.draws {
            if let Err(e) = self.ensure_pipeline(draw.key) {
                log::error!("Unable to build pipeline: {e}");
                pipeline_error.get_or_insert(e);
            }
        }

        let mut uniform_bytes = frame.uniforms;
        if uniform_bytes.is_empty() {
            uniform_bytes.resize(16, 0);
        }
        let uniform_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Uniform Buffer"),
            contents: &uniform_bytes,
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let mut uniform_groups: HashMap<ProgramId, wgpu::BindGroup> = HashMap::new();
        for draw in &frame.draws {
            let program = draw.key.program;
            uniform_groups.entry(program).or_insert_with(|| {
                let size = self.programs[program.index()].uniforms.bytes().len().max(16) as u64;
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    layout: &self.uniform_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &uniform_buffer,
                            offset: 0,
                            size: NonZeroU64::new(size),
                        }),
                    }],
                    label: Some("uniforms_bind_group"),
                })
            });
        }
        let texture_groups: Vec<_> = frame
            .draws
            .iter()
            .map(|draw| self.texture_group(&draw.textures))
            .collect();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        for pass in &frame.passes {
            let (colour, depth) = match pass.target {
                None => (&surface_view, &self.depth),
                Some(fb) => {
                    // destroyed after the pass was recorded
                    let Some(fb) = self.framebuffers.get(fb) else {
                        continue;
                    };
                    let Some(colour) = self.textures.get(fb.colour) else {
                        continue;
                    };
                    (&colour.view, &fb.depth)
                }
            };
            let (colour_load, depth_load) = match pass.clear {
                Some([r, g, b, a]) => (
                    wgpu::LoadOp::Clear(wgpu::Color {
                        r: r as f64,
                        g: g as f64,
                        b: b as f64,
                        a: a as f64,
                    }),
                    wgpu::LoadOp::Clear(1.0),
                ),
                None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: colour,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: colour_load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
                multiview_mask: None,
            });
            for &i in &pass.draws {
                let draw = &frame.draws[i];
                let (Some(Some(pipeline)), Some(uniforms), Some(mesh)) = (
                    self.pipelines.get(&draw.key),
                    uniform_groups.get(&draw.key.program),
                    self.meshes.get(draw.mesh),
                ) else {
                    continue;
                };
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, uniforms, &[draw.uniform_offset]);
                render_pass.set_bind_group(1, &texture_groups[i], &[]);
                render_pass.set_vertex_buffer(0, mesh.vertex.slice(..));
                render_pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }
        self.queue.submit(iter::once(encoder.finish()));
        self.window.pre_present_notify();
        output.present();
        match pipeline_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Run `create` in a validation error scope.
fn validated<T>(
    device: &wgpu::Device,
    label: &str,
    create: impl FnOnce(&wgpu::Device) -> T,
) -> Result<T> {
    let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create(device);
    match futures::executor::block_on(scope.pop()) {
        Some(e) => Err(SceneError::resource(label, e)),
        None => Ok(value),
    }
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32, label: &str) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_sampler(device: &wgpu::Device, address_mode: wgpu::AddressMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    image: &Image,
    format: wgpu::TextureFormat,
) -> GpuTexture {
    let (width, height) = (image.width().max(1), image.height().max(1));
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    // sampled colour data is stored in the surface's colour space
    let format = if format.is_srgb() {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let rgba = image.to_rgba();
    if !rgba.is_empty() {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            &rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * image.width()),
                rows_per_image: Some(image.height()),
            },
            size,
        );
    }
    GpuTexture {
        view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
        sampler: create_sampler(device, wgpu::AddressMode::Repeat),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Any adapter without a surface; `None` on machines without one.
    fn headless_device() -> Option<wgpu::Device> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::new_without_display_handle());
        let adapter =
            futures::executor::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default())).ok()?;
        let (device, _queue) =
            futures::executor::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default())).ok()?;
        Some(device)
    }

    fn shader(device: &wgpu::Device, wgsl: &str) -> Result<wgpu::ShaderModule> {
        validated(device, "test.wgsl", |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("test.wgsl"),
                source: wgpu::ShaderSource::Wgsl(wgsl.into()),
            })
        })
    }

    #[test]
    fn invalid_wgsl_is_a_load_error_not_a_panic() {
        let Some(device) = headless_device() else {
            return;
        };
        let err = shader(&device, "@vertex fn vs_main( {").unwrap_err();
        assert!(matches!(err, SceneError::ResourceLoad { ref path, .. } if path == "test.wgsl"));

        // the scope is popped, so later creations are unaffected
        let ok = shader(
            &device,
            "@vertex fn vs_main() -> @builtin(position) vec4f { return vec4f(0.0); }",
        );
        assert!(ok.is_ok());
    }
}

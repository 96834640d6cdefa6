#![allow(dead_code)]

use std::{cell::Cell, rc::Rc};

use scene_ngin::{
    context::{GraphicsContext, ProgramId, RecordingContext},
    data_structures::layout::VertexBufferLayout,
    error::Result,
    render::{Drawable, Mesh},
    shader::ShaderSource,
};

/// Uniform block of the lit scene program.
pub const SCENE_WGSL: &str = r#"
struct PointLight {
    lightColor: vec3<f32>,
    lightPos: vec3<f32>,
    ambientIntensity: f32,
    specularStrength: f32,
    constant: f32,
    linear: f32,
    quadratic: f32,
}

struct Uniforms {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    pointLights: array<PointLight, 2>,
    u_DiffuseMap: i32,
    u_DetailMap: i32,
}

@group(0) @binding(0) var<uniform> u: Uniforms;
"#;

/// Only the transforms, no samplers and no lights.
pub const UNLIT_WGSL: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
}
"#;

pub const FBO_WGSL: &str = "struct Uniforms { u_DiffuseMap: i32 }";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn program(ctx: &mut RecordingContext, label: &str, wgsl: &str) -> ProgramId {
    let source = ShaderSource::new(label, wgsl).unwrap();
    ctx.create_program(label, &source).unwrap()
}

pub fn scene_program(ctx: &mut RecordingContext) -> ProgramId {
    program(ctx, "scene", SCENE_WGSL)
}

/// How often a [`Tracked`] was bound and rendered.
#[derive(Debug, Default)]
pub struct Visits {
    pub binds: Cell<u32>,
    pub renders: Cell<u32>,
}

/// A single-triangle drawable that counts how often it is bound and rendered.
pub struct Tracked {
    mesh: Mesh,
    visits: Rc<Visits>,
}

impl Tracked {
    pub fn new(ctx: &mut RecordingContext) -> (Self, Rc<Visits>) {
        let mesh = Mesh::from_raw(
            ctx,
            "tracked",
            VertexBufferLayout::positions(),
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            &[0, 1, 2],
        )
        .unwrap();
        let visits = Rc::new(Visits::default());
        (
            Self {
                mesh,
                visits: Rc::clone(&visits),
            },
            visits,
        )
    }
}

impl Drawable for Tracked {
    fn bind(&self, _ctx: &mut dyn GraphicsContext) -> Result<()> {
        let binds = &self.visits.binds;
        binds.set(binds.get() + 1);
        Ok(())
    }

    fn render(&self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        let renders = &self.visits.renders;
        renders.set(renders.get() + 1);
        self.mesh.draw(ctx)
    }

    fn release(self: Box<Self>, ctx: &mut dyn GraphicsContext) -> Result<()> {
        self.mesh.release(ctx)
    }
}

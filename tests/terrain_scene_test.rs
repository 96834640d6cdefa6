mod common;

use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use cgmath::{Matrix4, Vector3};
use scene_ngin::{
    config::EngineConfig,
    context::{RecordingContext, Uniform},
    data_structures::{
        object::{DETAIL_SLOT, DIFFUSE_SLOT, Object},
        scene_graph::SceneNode,
        terrain::Terrain,
        transform::Transform,
    },
    error::SceneError,
    renderer::Renderer,
    shader::ShaderRegistry,
};

use crate::common::test_utils::init_logger;

fn asset(path: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("assets").join(path)
}

#[test]
fn shipped_shaders_declare_the_scene_uniforms() {
    let mut ctx = RecordingContext::new();
    let mut shaders = ShaderRegistry::new();
    let scene = shaders
        .load(&mut ctx, "scene", asset("shaders/scene.wgsl"))
        .unwrap();
    let fbo = shaders
        .load(&mut ctx, "framebuffer", asset("shaders/fbo.wgsl"))
        .unwrap();

    let layout = ctx.program_layout(scene).unwrap();
    for name in [
        "model",
        "view",
        "projection",
        "pointLights[1].lightPos",
        "u_DiffuseMap",
        "u_DetailMap",
    ] {
        assert!(layout.field(name).is_some(), "missing {name}");
    }
    assert!(ctx.program_layout(fbo).unwrap().field("u_DiffuseMap").is_some());
    assert_eq!(shaders.names(), vec!["framebuffer", "scene"]);
}

#[test]
fn missing_shaders_are_reported() {
    init_logger();
    let mut ctx = RecordingContext::new();
    let mut shaders = ShaderRegistry::new();
    assert!(
        shaders
            .load_or_warn(&mut ctx, "scene", asset("shaders/nope.wgsl"))
            .is_none()
    );
    assert!(matches!(
        shaders.require("scene"),
        Err(SceneError::ShaderNotFound(name)) if name == "scene"
    ));
}

#[test]
fn terrain_with_a_child_quad_renders_both() {
    let mut ctx = RecordingContext::new();
    let mut shaders = ShaderRegistry::new();
    let scene = shaders
        .load(&mut ctx, "scene", asset("shaders/scene.wgsl"))
        .unwrap();
    let fbo = shaders
        .load(&mut ctx, "framebuffer", asset("shaders/fbo.wgsl"))
        .unwrap();
    let mut renderer = Renderer::new(&mut ctx, 320, 240, &EngineConfig::default(), Some(fbo)).unwrap();

    let mut terrain = Terrain::load(&mut ctx, 16, 16, asset("textures/heightmap.ppm")).unwrap();
    terrain
        .load_textures(
            &mut ctx,
            asset("textures/colourmap.ppm"),
            asset("textures/detailmap.ppm"),
        )
        .unwrap();
    let quad = Object::make_textured_quad(&mut ctx, asset("textures/quad.ppm")).unwrap();
    let quad_texture = quad.diffuse().id();

    let mut ground = Transform::new();
    ground.translate(-8.0, -2.0, -16.0);
    let mut above = Transform::new();
    above.translate(8.0, 12.0, 8.0);

    let graph = renderer.scene_mut();
    let root = graph.insert(SceneNode::with_drawable(terrain, Some(scene)).with_transform(ground));
    let child = graph.insert(SceneNode::with_drawable(quad, Some(scene)).with_transform(above));
    graph.add_child(root, child).unwrap();
    renderer.set_root(root).unwrap();

    renderer.frame(&mut ctx).unwrap();

    let draws: Vec<_> = ctx.draw_calls().filter(|d| d.program == scene).collect();
    assert_eq!(draws.len(), 2);
    // 15x15 cells, two triangles each
    assert_eq!(draws[0].index_count, 15 * 15 * 6);
    assert!(draws[0].texture(DETAIL_SLOT).is_some());
    assert_eq!(draws[1].index_count, 6);
    assert_eq!(draws[1].texture(DIFFUSE_SLOT), Some(quad_texture));

    let Some(Uniform::Mat4(model)) = draws[1].uniform("model") else {
        panic!("quad drawn without a model matrix");
    };
    assert_relative_eq!(
        model,
        Matrix4::from_translation(Vector3::new(0.0, 10.0, -8.0)),
        epsilon = 1e-6
    );
    assert_eq!(draws[0].uniform("u_DetailMap"), Some(Uniform::Int(1)));
    assert_eq!(ctx.frames(), 1);
}

use std::path::{Path, PathBuf};

use scene_ngin::{
    Vector3,
    config::{Config, EngineConfig},
    context::GraphicsContext,
    data_structures::{
        object::Object,
        scene_graph::{NodeId, SceneNode},
        terrain::Terrain,
        transform::Transform,
    },
    flow::{SCENE_SHADER, SceneFlow, run},
    renderer::Renderer,
    shader::ShaderRegistry,
};

struct TerrainScene {
    assets: PathBuf,
    /// Rotation of the quad around its own vertical axis, in radians.
    spin: f32,
    quad: Option<NodeId>,
}

impl TerrainScene {
    fn asset(&self, name: &str) -> PathBuf {
        self.assets.join("textures").join(name)
    }
}

impl SceneFlow for TerrainScene {
    fn on_init(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        shaders: &mut ShaderRegistry,
        renderer: &mut Renderer,
    ) -> scene_ngin::Result<()> {
        let program = shaders.get(SCENE_SHADER);
        if program.is_none() {
            log::warn!("no scene shader, the terrain will not be drawn");
        }

        let mut terrain = Terrain::load(ctx, 64, 64, self.asset("heightmap.ppm"))?;
        terrain.load_textures(ctx, self.asset("colourmap.ppm"), self.asset("detailmap.ppm"))?;
        let mut ground = Transform::new();
        ground.translate(-32.0, -8.0, -64.0).scale(1.0, 0.25, 1.0);

        let quad = Object::make_textured_quad(ctx, self.asset("quad.ppm"))?;
        let mut above = Transform::new();
        above.translate(32.0, 56.0, 48.0).scale(4.0, 16.0, 1.0);

        let scene = renderer.scene_mut();
        let root = scene.insert(SceneNode::with_drawable(terrain, program).with_transform(ground));
        let child = scene.insert(SceneNode::with_drawable(quad, program).with_transform(above));
        scene.add_child(root, child)?;
        renderer.set_root(root)?;
        self.quad = Some(child);
        Ok(())
    }

    fn on_update(&mut self, renderer: &mut Renderer, dt: std::time::Duration) {
        let Some(quad) = self.quad else {
            return;
        };
        self.spin += dt.as_secs_f32();
        if let Some(local) = renderer.scene_mut().local_transform_mut(quad) {
            local
                .load_identity()
                .translate(32.0, 56.0, 48.0)
                .rotate(self.spin, Vector3::unit_y())
                .scale(4.0, 16.0, 1.0);
        }
    }
}

fn main() -> anyhow::Result<()> {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut config = EngineConfig::load_from_file(manifest.join("scene.toml"))?;
    // shader paths in the config are relative to the repository root
    let repo = manifest.join("../..");
    config.shaders.scene = repo.join(&config.shaders.scene).display().to_string();
    config.shaders.framebuffer = repo.join(&config.shaders.framebuffer).display().to_string();
    run(
        config,
        TerrainScene {
            assets: repo.join("assets"),
            spin: 0.0,
            quad: None,
        },
    )
}

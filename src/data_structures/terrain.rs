//! Height-map terrain.

use std::path::Path;

use crate::{
    context::GraphicsContext,
    data_structures::geometry::Geometry,
    error::{Result, SceneError},
    render::{Drawable, Mesh},
    resources::{self, Image},
};

use super::{
    object::{DETAIL_SLOT, DIFFUSE_SLOT},
    texture::Texture,
};

/// Red channel values are divided by this to flatten the terrain.
pub const HEIGHT_SCALE: f32 = 5.0;

/// A grid of `x_segments * z_segments` vertices, one unit apart, whose heights
/// come from the red channel of a height map.
#[derive(Debug)]
pub struct Terrain {
    x_segments: u32,
    z_segments: u32,
    heights: Vec<f32>,
    mesh: Mesh,
    diffuse: Option<Texture>,
    detail: Option<Texture>,
}

impl Terrain {
    /// Load the height map (bottom row first) and build the grid.
    pub fn load(
        ctx: &mut dyn GraphicsContext,
        x_segments: u32,
        z_segments: u32,
        height_map: impl AsRef<Path>,
    ) -> Result<Self> {
        let image = resources::load_image(height_map, true)?;
        Self::from_height_map(ctx, x_segments, z_segments, &image)
    }

    pub fn from_height_map(
        ctx: &mut dyn GraphicsContext,
        x_segments: u32,
        z_segments: u32,
        height_map: &Image,
    ) -> Result<Self> {
        let heights = sample_heights(x_segments, z_segments, height_map)?;
        let geometry = build_grid(x_segments, z_segments, &heights)?;
        let mesh = Mesh::from_geometry(ctx, "terrain", &geometry)?;
        log::debug!(
            "terrain {x_segments}x{z_segments} from a {}x{} height map",
            height_map.width(),
            height_map.height()
        );
        Ok(Self {
            x_segments,
            z_segments,
            heights,
            mesh,
            diffuse: None,
            detail: None,
        })
    }

    /// Colour map on slot 0, detail map on slot 1.
    pub fn load_textures(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        colour: impl AsRef<Path>,
        detail: impl AsRef<Path>,
    ) -> Result<()> {
        let diffuse = Texture::load(ctx, colour, true)?;
        let detail = match Texture::load(ctx, detail, true) {
            Ok(detail) => detail,
            Err(e) => {
                diffuse.release(ctx)?;
                return Err(e);
            }
        };
        self.set_textures(ctx, diffuse, detail)
    }

    /// Replace both maps, freeing the previous ones.
    pub fn set_textures(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        diffuse: Texture,
        detail: Texture,
    ) -> Result<()> {
        let old = [self.diffuse.replace(diffuse), self.detail.replace(detail)];
        for texture in old.into_iter().flatten() {
            texture.release(ctx)?;
        }
        Ok(())
    }

    pub fn x_segments(&self) -> u32 {
        self.x_segments
    }

    pub fn z_segments(&self) -> u32 {
        self.z_segments
    }

    /// Height of the grid vertex at `(x, z)`.
    pub fn height_at(&self, x: u32, z: u32) -> Option<f32> {
        (x < self.x_segments && z < self.z_segments)
            .then(|| self.heights[(z * self.x_segments + x) as usize])
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }
}

impl Drawable for Terrain {
    fn bind(&self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        if let Some(diffuse) = &self.diffuse {
            diffuse.bind(ctx, DIFFUSE_SLOT)?;
        }
        if let Some(detail) = &self.detail {
            detail.bind(ctx, DETAIL_SLOT)?;
        }
        Ok(())
    }

    fn render(&self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        self.bind(ctx)?;
        self.mesh.draw(ctx)
    }

    fn sampler_uniforms(&self) -> Vec<(&'static str, i32)> {
        vec![
            ("u_DiffuseMap", DIFFUSE_SLOT as i32),
            ("u_DetailMap", DETAIL_SLOT as i32),
        ]
    }

    fn release(self: Box<Self>, ctx: &mut dyn GraphicsContext) -> Result<()> {
        let Terrain {
            mesh,
            diffuse,
            detail,
            ..
        } = *self;
        mesh.release(ctx)?;
        for texture in [diffuse, detail].into_iter().flatten() {
            texture.release(ctx)?;
        }
        Ok(())
    }
}

/// Nearest-neighbour sample of the red channel, row-major with stride `x_segments`.
fn sample_heights(x_segments: u32, z_segments: u32, height_map: &Image) -> Result<Vec<f32>> {
    if x_segments < 2 || z_segments < 2 {
        return Err(SceneError::resource(
            "<terrain>",
            format!("a grid needs at least 2x2 vertices, got {x_segments}x{z_segments}"),
        ));
    }
    // vertex indices are u32
    let count = x_segments.checked_mul(z_segments).ok_or_else(|| {
        SceneError::resource(
            "<terrain>",
            format!("a {x_segments}x{z_segments} grid has too many vertices"),
        )
    })?;
    let (width, height) = (height_map.width() as u64, height_map.height() as u64);
    let mut heights = Vec::with_capacity(count as usize);
    for z in 0..z_segments as u64 {
        for x in 0..x_segments as u64 {
            let px = (x * width / x_segments as u64) as u32;
            let pz = (z * height / z_segments as u64) as u32;
            let [r, _, _] = height_map
                .pixel(px, pz)
                .ok_or_else(|| SceneError::out_of_range("pixel", px as usize, width as usize))?;
            heights.push(r as f32 / HEIGHT_SCALE);
        }
    }
    Ok(heights)
}

fn build_grid(x_segments: u32, z_segments: u32, heights: &[f32]) -> Result<Geometry> {
    let mut geometry = Geometry::new();
    for z in 0..z_segments {
        for x in 0..x_segments {
            let u = 1.0 - x as f32 / x_segments as f32;
            let v = 1.0 - z as f32 / z_segments as f32;
            let y = heights[(z * x_segments + x) as usize];
            geometry.add_vertex(x as f32, y, z as f32, u, v);
        }
    }
    for z in 0..z_segments - 1 {
        for x in 0..x_segments - 1 {
            let i = x + z * x_segments;
            geometry.make_triangle(i, i + x_segments, i + 1)?;
            geometry.make_triangle(i + 1, i + x_segments, i + x_segments + 1)?;
        }
    }
    geometry.compute_normals();
    Ok(geometry)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use cgmath::Vector3;

    use super::*;
    use crate::context::RecordingContext;

    #[test]
    fn heights_come_from_the_red_channel() {
        let mut map = Image::new(2, 2);
        map.set_pixel(1, 0, [50, 0, 0]).unwrap();
        map.set_pixel(0, 1, [100, 255, 255]).unwrap();
        let mut ctx = RecordingContext::new();
        let terrain = Terrain::from_height_map(&mut ctx, 2, 2, &map).unwrap();
        assert_eq!(terrain.height_at(0, 0), Some(0.0));
        assert_eq!(terrain.height_at(1, 0), Some(10.0));
        assert_eq!(terrain.height_at(0, 1), Some(20.0));
        assert_eq!(terrain.height_at(2, 0), None);
    }

    #[test]
    fn non_square_grid_uses_x_segments_as_row_stride() {
        let geometry = build_grid(4, 2, &[0.0; 8]).unwrap();
        assert_eq!(geometry.vertex_count(), 8);
        // three cells, two triangles each
        assert_eq!(geometry.indices().len(), 18);
        assert_eq!(&geometry.indices()[..6], &[0, 4, 1, 1, 4, 5]);
        assert!(geometry.indices().iter().all(|&i| i < 8));
    }

    #[test]
    fn flat_grid_has_upward_normals_and_flipped_uvs() {
        let geometry = build_grid(3, 3, &[1.0; 9]).unwrap();
        for i in 0..9 {
            assert_relative_eq!(geometry.normal(i).unwrap(), Vector3::new(0.0, 1.0, 0.0));
        }
        let uv = geometry.uv(1).unwrap();
        assert_relative_eq!(uv.x, 1.0 - 1.0 / 3.0);
        assert_relative_eq!(uv.y, 1.0);
        assert_relative_eq!(geometry.position(4).unwrap(), Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn height_map_is_resampled_to_the_grid() {
        let map = Image::filled(2, 2, [25, 0, 0]);
        let mut ctx = RecordingContext::new();
        let terrain = Terrain::from_height_map(&mut ctx, 8, 5, &map).unwrap();
        assert_eq!(terrain.height_at(7, 4), Some(5.0));
        assert_eq!(ctx.mesh_vertex_count(terrain.mesh().id()), Some(40));
    }

    #[test]
    fn degenerate_grids_are_rejected() {
        let mut ctx = RecordingContext::new();
        let map = Image::new(1, 1);
        assert!(Terrain::from_height_map(&mut ctx, 1, 4, &map).is_err());
    }

    #[test]
    fn grids_beyond_u32_indices_are_rejected() {
        let mut ctx = RecordingContext::new();
        let map = Image::new(1, 1);
        let err = Terrain::from_height_map(&mut ctx, 1 << 16, 1 << 16, &map).unwrap_err();
        assert!(matches!(err, SceneError::ResourceLoad { .. }), "{err}");
        assert_eq!(ctx.mesh_count(), 0);
    }

    #[test]
    fn replacing_textures_frees_the_old_maps() {
        let mut ctx = RecordingContext::new();
        let mut terrain = Terrain::from_height_map(&mut ctx, 2, 2, &Image::new(2, 2)).unwrap();
        for _ in 0..3 {
            let diffuse = Texture::from_image(&mut ctx, "colour", &Image::new(1, 1)).unwrap();
            let detail = Texture::from_image(&mut ctx, "detail", &Image::new(1, 1)).unwrap();
            terrain.set_textures(&mut ctx, diffuse, detail).unwrap();
        }
        assert_eq!(ctx.texture_count(), 2);

        let boxed: Box<dyn Drawable> = Box::new(terrain);
        boxed.release(&mut ctx).unwrap();
        assert_eq!((ctx.mesh_count(), ctx.texture_count()), (0, 0));
    }

    #[test]
    fn samplers_cover_both_maps() {
        let mut ctx = RecordingContext::new();
        let terrain = Terrain::from_height_map(&mut ctx, 2, 2, &Image::new(2, 2)).unwrap();
        assert_eq!(
            terrain.sampler_uniforms(),
            vec![("u_DiffuseMap", 0), ("u_DetailMap", 1)]
        );
    }
}

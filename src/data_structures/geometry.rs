//! CPU-side mesh data: per-attribute arrays that are interleaved on upload.

use cgmath::{InnerSpace, Vector2, Vector3, Zero};

use crate::error::{Result, SceneError};

const PLACEHOLDER: [f32; 3] = [0.0, 0.0, 1.0];

/// Positions, normals, texture coordinates, tangents, bitangents and indices.
///
/// New vertices get a `(0, 0, 1)` normal, tangent and bitangent until
/// [`make_triangle`](Self::make_triangle) or [`compute_normals`](Self::compute_normals)
/// assign real ones.
#[derive(Clone, Debug, Default)]
pub struct Geometry {
    positions: Vec<Vector3<f32>>,
    normals: Vec<Vector3<f32>>,
    uvs: Vec<Vector2<f32>>,
    tangents: Vec<Vector3<f32>>,
    bitangents: Vec<Vector3<f32>>,
    indices: Vec<u32>,
}

impl Geometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, x: f32, y: f32, z: f32, s: f32, t: f32) -> u32 {
        self.positions.push(Vector3::new(x, y, z));
        self.uvs.push(Vector2::new(s, t));
        self.normals.push(PLACEHOLDER.into());
        self.tangents.push(PLACEHOLDER.into());
        self.bitangents.push(PLACEHOLDER.into());
        (self.positions.len() - 1) as u32
    }

    pub fn add_index(&mut self, index: u32) -> Result<()> {
        self.check(index)?;
        self.indices.push(index);
        Ok(())
    }

    fn check(&self, index: u32) -> Result<usize> {
        let i = index as usize;
        if i >= self.positions.len() {
            return Err(SceneError::out_of_range("vertex", i, self.positions.len()));
        }
        Ok(i)
    }

    /// Push a triangle and give its three vertices the triangle's tangent frame.
    pub fn make_triangle(&mut self, v0: u32, v1: u32, v2: u32) -> Result<()> {
        let (a, b, c) = (self.check(v0)?, self.check(v1)?, self.check(v2)?);
        self.indices.extend_from_slice(&[v0, v1, v2]);

        let edge0 = self.positions[b] - self.positions[a];
        let edge1 = self.positions[c] - self.positions[a];
        let delta_uv0 = self.uvs[b] - self.uvs[a];
        let delta_uv1 = self.uvs[c] - self.uvs[a];

        let det = delta_uv0.x * delta_uv1.y - delta_uv1.x * delta_uv0.y;
        // degenerate uv mapping: keep the placeholders
        if det.abs() <= f32::EPSILON {
            log::warn!("triangle ({v0}, {v1}, {v2}) has degenerate texture coordinates");
            return Ok(());
        }
        let f = 1.0 / det;
        let tangent = ((edge0 * delta_uv1.y - edge1 * delta_uv0.y) * f).normalize();
        let bitangent = ((edge1 * delta_uv0.x - edge0 * delta_uv1.x) * f).normalize();

        for i in [a, b, c] {
            self.normals[i] = PLACEHOLDER.into();
            self.tangents[i] = tangent;
            self.bitangents[i] = bitangent;
        }
        Ok(())
    }

    /// Replace the normals with area-weighted averages of the adjacent face normals.
    pub fn compute_normals(&mut self) {
        let mut sums = vec![Vector3::zero(); self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let face = (self.positions[b] - self.positions[a])
                .cross(self.positions[c] - self.positions[a]);
            sums[a] += face;
            sums[b] += face;
            sums[c] += face;
        }
        for (normal, sum) in self.normals.iter_mut().zip(sums) {
            if sum.magnitude2() > f32::EPSILON {
                *normal = sum.normalize();
            }
        }
    }

    /// Interleave into the 14-float layout: position, normal, uv, tangent, bitangent.
    pub fn interleave(&self) -> Vec<f32> {
        let mut data = Vec::with_capacity(self.positions.len() * 14);
        for i in 0..self.positions.len() {
            let p = self.positions[i];
            let n = self.normals[i];
            let uv = self.uvs[i];
            let t = self.tangents[i];
            let b = self.bitangents[i];
            data.extend_from_slice(&[
                p.x, p.y, p.z, n.x, n.y, n.z, uv.x, uv.y, t.x, t.y, t.z, b.x, b.y, b.z,
            ]);
        }
        data
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn position(&self, index: usize) -> Option<Vector3<f32>> {
        self.positions.get(index).copied()
    }

    pub fn normal(&self, index: usize) -> Option<Vector3<f32>> {
        self.normals.get(index).copied()
    }

    pub fn uv(&self, index: usize) -> Option<Vector2<f32>> {
        self.uvs.get(index).copied()
    }

    pub fn tangent(&self, index: usize) -> Option<Vector3<f32>> {
        self.tangents.get(index).copied()
    }

    pub fn bitangent(&self, index: usize) -> Option<Vector3<f32>> {
        self.bitangents.get(index).copied()
    }
}

//! Vertex buffer layouts: stride plus the float offset of each attribute.

use crate::error::{Result, SceneError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Shader input location.
    pub location: u32,
    /// Number of f32 components.
    pub components: usize,
    /// Offset in floats from the start of the vertex.
    pub offset: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayoutKind {
    Positions,
    Textured,
    NormalMapped,
    ScreenQuad,
}

/// Describes how an interleaved f32 vertex buffer is split into attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexBufferLayout {
    kind: LayoutKind,
    stride: usize,
    attributes: Vec<VertexAttribute>,
}

impl VertexBufferLayout {
    /// xyz
    pub fn positions() -> Self {
        Self::from_components(LayoutKind::Positions, &[3])
    }

    /// xyz, st
    pub fn textured() -> Self {
        Self::from_components(LayoutKind::Textured, &[3, 2])
    }

    /// xyz, normal, st, tangent, bitangent. Matches [`Geometry::interleave`](super::geometry::Geometry::interleave).
    pub fn normal_mapped() -> Self {
        Self::from_components(LayoutKind::NormalMapped, &[3, 3, 2, 3, 3])
    }

    /// xy, st in normalized device coordinates.
    pub fn screen_quad() -> Self {
        Self::from_components(LayoutKind::ScreenQuad, &[2, 2])
    }

    fn from_components(kind: LayoutKind, components: &[usize]) -> Self {
        let mut offset = 0;
        let attributes = components
            .iter()
            .enumerate()
            .map(|(location, &components)| {
                let attribute = VertexAttribute {
                    location: location as u32,
                    components,
                    offset,
                };
                offset += components;
                attribute
            })
            .collect();
        Self {
            kind,
            stride: offset,
            attributes,
        }
    }

    pub fn kind(&self) -> LayoutKind {
        self.kind
    }

    /// Floats per vertex.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn stride_in_bytes(&self) -> usize {
        self.stride * std::mem::size_of::<f32>()
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Number of whole vertices in `vertices`, or `LayoutMismatch` if the data
    /// does not split into strides.
    pub fn validate(&self, vertices: &[f32]) -> Result<usize> {
        let overrun = self
            .attributes
            .iter()
            .any(|a| a.offset + a.components > self.stride);
        if self.stride == 0 || overrun || vertices.len() % self.stride != 0 {
            return Err(SceneError::LayoutMismatch {
                stride: self.stride,
                len: vertices.len(),
            });
        }
        Ok(vertices.len() / self.stride)
    }
}

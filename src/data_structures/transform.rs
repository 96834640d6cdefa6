//! Affine 4x4 transforms for scene nodes.
//!
//! Every operation right-multiplies the current matrix, so a sequence of calls
//! composes in call order: the last call is the first one applied to a point in
//! object space.

use std::ops::Mul;

use cgmath::{InnerSpace, Matrix4, Point3, Rad, SquareMatrix, Transform as _, Vector3};

/// A node-local or world transform. Identity by default.
///
/// Only translate, rotate and scale are exposed, so the matrix always stays
/// affine. Local transforms are not accumulated by the renderer: callers that
/// animate reset with [`Transform::load_identity`] once per frame and then apply
/// that frame's operations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    matrix: Matrix4<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform {
    pub fn new() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    pub fn from_matrix(matrix: Matrix4<f32>) -> Self {
        Self { matrix }
    }

    pub fn load_identity(&mut self) -> &mut Self {
        self.matrix = Matrix4::identity();
        self
    }

    pub fn translate(&mut self, x: f32, y: f32, z: f32) -> &mut Self {
        self.matrix = self.matrix * Matrix4::from_translation(Vector3::new(x, y, z));
        self
    }

    /// Rotate by `radians` around `axis`. The axis does not need to be normalized,
    /// but a zero axis is ignored.
    pub fn rotate(&mut self, radians: f32, axis: Vector3<f32>) -> &mut Self {
        if axis.magnitude2() <= f32::EPSILON {
            log::warn!("ignoring rotation around a zero-length axis");
            return self;
        }
        self.matrix = self.matrix * Matrix4::from_axis_angle(axis.normalize(), Rad(radians));
        self
    }

    pub fn scale(&mut self, x: f32, y: f32, z: f32) -> &mut Self {
        self.matrix = self.matrix * Matrix4::from_nonuniform_scale(x, y, z);
        self
    }

    pub fn matrix(&self) -> &Matrix4<f32> {
        &self.matrix
    }

    pub fn transform_point(&self, point: Point3<f32>) -> Point3<f32> {
        self.matrix.transform_point(point)
    }

    pub fn is_identity(&self) -> bool {
        self.matrix == Matrix4::identity()
    }
}

impl From<Matrix4<f32>> for Transform {
    fn from(matrix: Matrix4<f32>) -> Self {
        Self::from_matrix(matrix)
    }
}

impl Mul<Transform> for Transform {
    type Output = Self;

    fn mul(self, rhs: Transform) -> Self::Output {
        Transform {
            matrix: self.matrix * rhs.matrix,
        }
    }
}

impl<'a, 'b> Mul<&'b Transform> for &'a Transform {
    type Output = Transform;

    fn mul(self, rhs: &'b Transform) -> Self::Output {
        Transform {
            matrix: self.matrix * rhs.matrix,
        }
    }
}

//! Engine data structures: transforms, geometry, drawables and the scene graph.
//!
//! This module contains the core data types for scene representation:
//!
//! - `transform` affine node transforms
//! - `geometry` CPU-side vertex data and its interleaving
//! - `layout` vertex buffer strides and attribute offsets
//! - `texture` uploaded images
//! - `object` textured meshes, e.g. the textured quad
//! - `terrain` height-map terrain
//! - `framebuffer` the off-screen target and its composite quad
//! - `scene_graph` enables hierarchical scene organization

pub mod framebuffer;
pub mod geometry;
pub mod layout;
pub mod object;
pub mod scene_graph;
pub mod terrain;
pub mod texture;
pub mod transform;

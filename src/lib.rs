//! scene-ngin
//!
//! A small retained-mode scene graph with hierarchical transforms, textured
//! objects, height-map terrain and an off-screen framebuffer pass. Every GPU
//! side effect goes through an explicit [`context::GraphicsContext`], so scenes
//! can be driven by the headless [`context::RecordingContext`] in tests and by
//! the wgpu backend (feature `gpu`) in a window.
//!
//! High-level modules
//! - `camera`: first-person camera, projection and keyboard controller
//! - `config`: engine configuration loaded from TOML
//! - `context`: the graphics context trait, its handles and implementations
//! - `data_structures`: transforms, geometry, drawables and the scene graph
//! - `error`: the crate's error type
//! - `flow`: the winit event loop driving a renderer (feature `gpu`)
//! - `light`: point lights
//! - `render`: the drawable interface and uploaded meshes
//! - `renderer`: per-frame update and render passes
//! - `resources`: file loading and the PPM image codec
//! - `shader`: shader sources, uniform reflection and the shader registry
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
#[cfg(feature = "gpu")]
pub mod flow;
pub mod light;
pub mod render;
pub mod renderer;
pub mod resources;
pub mod shader;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath::*;
pub use error::{Result, SceneError};
pub use winit::event::WindowEvent;
pub use winit::keyboard::KeyCode;

//! Engine configuration loaded from TOML.
//!
//! Every section is `#[serde(default)]`, so a config file only needs the keys
//! it wants to change.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Load/save support for any serde-backed settings struct.
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        ensure_toml(path)?;
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        ensure_toml(path)?;
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

fn ensure_toml(path: &Path) -> Result<(), ConfigError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => Ok(()),
        _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub projection: ProjectionConfig,
    pub camera: CameraConfig,
    pub shaders: ShaderConfig,
    pub render: RenderConfig,
}

impl Config for EngineConfig {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "scene-ngin".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ProjectionConfig {
    pub fovy_degrees: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            fovy_degrees: 45.0,
            znear: 0.1,
            zfar: 512.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Degrees of rotation per pixel of mouse movement.
    pub sensitivity: f32,
    /// Distance moved per frame while a movement key is held.
    pub speed: f32,
    pub eye: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            sensitivity: 0.2,
            speed: 0.5,
            eye: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ShaderConfig {
    pub scene: String,
    pub framebuffer: String,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            scene: "assets/shaders/scene.wgsl".to_string(),
            framebuffer: "assets/shaders/fbo.wgsl".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub clear_colour: [f32; 4],
    pub composite_clear_colour: [f32; 4],
    /// Draw the scene into an off-screen framebuffer and composite it.
    pub offscreen: bool,
    pub wireframe: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clear_colour: [0.01, 0.01, 0.01, 1.0],
            composite_clear_colour: [1.0, 1.0, 1.0, 1.0],
            offscreen: true,
            wireframe: false,
        }
    }
}

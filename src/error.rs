//! Typed errors for resource loading, shader uniforms and index validation.
//!
//! Nothing in here is transient: every variant describes a configuration or
//! caller mistake, so callers decide between failing fast and degrading.

use crate::config::ConfigError;

#[derive(thiserror::Error, Debug)]
pub enum SceneError {
    /// A shader, texture, height map or other file could not be read or parsed.
    #[error("failed to load resource `{path}`: {reason}")]
    ResourceLoad { path: String, reason: String },

    /// The bound program does not declare a uniform with this name and type.
    #[error("program `{program}` has no uniform `{uniform}`")]
    ShaderUniformNotFound { program: String, uniform: String },

    #[error("no shader program registered under `{0}`")]
    ShaderNotFound(String),

    #[error("{what} index {index} is out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// A mesh, texture or framebuffer handle whose resource was destroyed.
    #[error("{0} handle refers to a destroyed resource")]
    StaleHandle(&'static str),

    /// Vertex data does not fit the declared layout stride.
    #[error("vertex data of {len} floats does not match stride {stride}")]
    LayoutMismatch { stride: usize, len: usize },

    #[error("invalid scene hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error("scene node does not exist (removed or from another graph)")]
    UnknownNode,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("graphics backend error: {0}")]
    Backend(String),
}

impl SceneError {
    pub fn resource(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        Self::ResourceLoad {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { what, index, len }
    }
}

pub type Result<T> = std::result::Result<T, SceneError>;

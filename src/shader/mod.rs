/**
 * Shader programs and the registry that names them.
 *
 * A program is a single WGSL module exposing `vs_main` and `fs_main`. Its
 * settable uniforms are the members of the module's `struct Uniforms`, see
 * [`reflect`].
 */
pub mod reflect;

use std::{collections::HashMap, path::Path, sync::Arc};

use crate::{
    context::{GraphicsContext, ProgramId},
    error::{Result, SceneError},
    resources,
};

use reflect::UniformLayout;

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

#[derive(Clone, Debug)]
pub struct ShaderSource {
    label: String,
    wgsl: String,
    uniforms: Arc<UniformLayout>,
}

impl ShaderSource {
    pub fn new(label: impl Into<String>, wgsl: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let wgsl = wgsl.into();
        let uniforms = UniformLayout::reflect(&wgsl).map_err(|e| SceneError::resource(&label, e))?;
        Ok(Self {
            label,
            wgsl,
            uniforms: Arc::new(uniforms),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let wgsl = resources::load_string(path)?;
        Self::new(path.display().to_string(), wgsl)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn wgsl(&self) -> &str {
        &self.wgsl
    }

    pub fn uniforms(&self) -> &Arc<UniformLayout> {
        &self.uniforms
    }
}

/// Named programs, owned by whoever composes the scene.
#[derive(Debug, Default)]
pub struct ShaderRegistry {
    programs: HashMap<String, ProgramId>,
}

impl ShaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `source` and register it as `name`, replacing an earlier program
    /// with the same name.
    pub fn create(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        name: &str,
        source: &ShaderSource,
    ) -> Result<ProgramId> {
        let program = ctx.create_program(name, source)?;
        if let Some(old) = self.programs.insert(name.to_string(), program) {
            log::warn!("shader `{name}` re-registered, replacing program {old:?}");
        }
        log::debug!("registered shader `{name}` as {program:?}");
        Ok(program)
    }

    pub fn load(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        name: &str,
        path: impl AsRef<Path>,
    ) -> Result<ProgramId> {
        let source = ShaderSource::from_file(path)?;
        self.create(ctx, name, &source)
    }

    /// Like [`load`](Self::load) but logs the failure and returns `None`, for
    /// scenes that should still render the nodes whose shaders did compile.
    pub fn load_or_warn(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        name: &str,
        path: impl AsRef<Path>,
    ) -> Option<ProgramId> {
        match self.load(ctx, name, path) {
            Ok(program) => Some(program),
            Err(e) => {
                log::warn!("shader `{name}` unavailable: {e}");
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<ProgramId> {
        self.programs.get(name).copied()
    }

    pub fn require(&self, name: &str) -> Result<ProgramId> {
        self.get(name)
            .ok_or_else(|| SceneError::ShaderNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.programs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RecordingContext;

    const BASIC: &str = "struct Uniforms { model: mat4x4<f32> }";

    #[test]
    fn create_and_lookup() {
        let mut ctx = RecordingContext::new();
        let mut shaders = ShaderRegistry::new();
        let source = ShaderSource::new("basic", BASIC).unwrap();
        let id = shaders.create(&mut ctx, "basic", &source).unwrap();

        assert_eq!(shaders.get("basic"), Some(id));
        assert_eq!(shaders.require("basic").unwrap(), id);
        assert!(shaders.contains("basic"));
        assert_eq!(shaders.len(), 1);
        assert!(shaders.get("terrain").is_none());
        assert!(matches!(
            shaders.require("terrain"),
            Err(SceneError::ShaderNotFound(name)) if name == "terrain"
        ));
    }

    #[test]
    fn re_registering_replaces_the_program() {
        let mut ctx = RecordingContext::new();
        let mut shaders = ShaderRegistry::new();
        let source = ShaderSource::new("basic", BASIC).unwrap();
        let first = shaders.create(&mut ctx, "basic", &source).unwrap();
        let second = shaders.create(&mut ctx, "basic", &source).unwrap();
        assert_ne!(first, second);
        assert_eq!(shaders.get("basic"), Some(second));
        assert_eq!(shaders.len(), 1);
    }

    #[test]
    fn missing_file_is_a_resource_error() {
        let mut ctx = RecordingContext::new();
        let mut shaders = ShaderRegistry::new();
        let err = shaders
            .load(&mut ctx, "scene", "does/not/exist.wgsl")
            .unwrap_err();
        assert!(matches!(err, SceneError::ResourceLoad { .. }));
        assert!(shaders.is_empty());
        assert!(shaders.load_or_warn(&mut ctx, "scene", "does/not/exist.wgsl").is_none());
    }

    #[test]
    fn unparsable_uniforms_are_rejected() {
        let err = ShaderSource::new("broken", "struct Uniforms { a: array<f32> }").unwrap_err();
        assert!(matches!(err, SceneError::ResourceLoad { path, .. } if path == "broken"));
    }

    #[test]
    fn names_are_sorted() {
        let mut ctx = RecordingContext::new();
        let mut shaders = ShaderRegistry::new();
        let source = ShaderSource::new("s", BASIC).unwrap();
        for name in ["terrain", "fbo", "object"] {
            shaders.create(&mut ctx, name, &source).unwrap();
        }
        assert_eq!(shaders.names(), vec!["fbo", "object", "terrain"]);
    }
}

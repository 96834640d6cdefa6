//! Scene graph and hierarchical scene organization.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`], so the tree
//! owns every node exactly once and a node can never become its own ancestor.
//! World transforms are recomputed from the local transforms on every
//! [`update`](SceneGraph::update): a node's world transform is its parent's
//! world transform times its own local transform.
//!
//! Nodes own their drawables. [`remove`](SceneGraph::remove) hands the
//! drawables of the removed subtree back to the context.

use cgmath::Matrix4;
use slotmap::{SlotMap, new_key_type};

use crate::{
    camera::Camera,
    context::{GraphicsContext, ProgramId, Uniform},
    error::{Result, SceneError},
    light::PointLight,
    render::Drawable,
};

use super::transform::Transform;

new_key_type! {
    /// Stable handle of a node within a [`SceneGraph`].
    ///
    /// Stays valid until the node is removed; ids of removed nodes are never reused.
    pub struct NodeId;
}

/// A node in the tree. Nodes without a drawable only group and transform their children.
#[derive(Default)]
pub struct SceneNode {
    drawable: Option<Box<dyn Drawable>>,
    program: Option<ProgramId>,
    local: Transform,
    world: Transform,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl std::fmt::Debug for SceneNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneNode")
            .field("drawable", &self.drawable.is_some())
            .field("program", &self.program)
            .field("local", &self.local)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .finish()
    }
}

impl SceneNode {
    /// An empty grouping node.
    pub fn new() -> Self {
        Self::default()
    }

    /// `program` is `None` when the node's shader failed to load; such nodes
    /// still transform their children but draw nothing.
    pub fn with_drawable(drawable: impl Drawable + 'static, program: Option<ProgramId>) -> Self {
        Self {
            drawable: Some(Box::new(drawable)),
            program,
            ..Self::default()
        }
    }

    pub fn with_transform(mut self, local: Transform) -> Self {
        self.local = local;
        self
    }

    pub fn drawable(&self) -> Option<&dyn Drawable> {
        self.drawable.as_deref()
    }

    /// Returns the previous drawable, whose resources are now the caller's to release.
    pub fn set_drawable(&mut self, drawable: Option<Box<dyn Drawable>>) -> Option<Box<dyn Drawable>> {
        std::mem::replace(&mut self.drawable, drawable)
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    pub fn set_program(&mut self, program: Option<ProgramId>) {
        self.program = program;
    }

    pub fn local_transform(&self) -> &Transform {
        &self.local
    }

    pub fn local_transform_mut(&mut self) -> &mut Transform {
        &mut self.local
    }

    /// As of the last update.
    pub fn world_transform(&self) -> &Transform {
        &self.world
    }

    /// Overwritten by the next update.
    pub fn world_transform_mut(&mut self) -> &mut Transform {
        &mut self.world
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Per-frame inputs pushed into every drawable node's program.
pub struct FrameUniforms<'a> {
    pub projection: Matrix4<f32>,
    pub camera: &'a Camera,
    pub lights: &'a [PointLight],
}

#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeId, SceneNode>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a detached node. Attach it with [`add_child`](Self::add_child).
    pub fn insert(&mut self, mut node: SceneNode) -> NodeId {
        node.parent = None;
        node.children.clear();
        self.nodes.insert(node)
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id)
    }

    fn node(&self, id: NodeId) -> Result<&SceneNode> {
        self.nodes.get(id).ok_or(SceneError::UnknownNode)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map_or(&[], |n| n.children.as_slice())
    }

    pub fn local_transform(&self, id: NodeId) -> Option<&Transform> {
        self.nodes.get(id).map(|n| &n.local)
    }

    pub fn local_transform_mut(&mut self, id: NodeId) -> Option<&mut Transform> {
        self.nodes.get_mut(id).map(|n| &mut n.local)
    }

    pub fn world_transform(&self, id: NodeId) -> Option<&Transform> {
        self.nodes.get(id).map(|n| &n.world)
    }

    pub fn world_transform_mut(&mut self, id: NodeId) -> Option<&mut Transform> {
        self.nodes.get_mut(id).map(|n| &mut n.world)
    }

    fn is_ancestor(&self, ancestor: NodeId, mut id: NodeId) -> bool {
        while let Some(parent) = self.parent(id) {
            if parent == ancestor {
                return true;
            }
            id = parent;
        }
        false
    }

    /// Make `child` the last child of `parent`, detaching it from its previous parent.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.node(parent)?;
        self.node(child)?;
        if parent == child {
            return Err(SceneError::InvalidHierarchy(
                "a node cannot be its own child".to_string(),
            ));
        }
        if self.is_ancestor(child, parent) {
            return Err(SceneError::InvalidHierarchy(
                "a node cannot become a child of its own descendant".to_string(),
            ));
        }
        self.detach(child);
        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);
        Ok(())
    }

    /// Unlink `id` from its parent, keeping its own subtree.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.nodes.get_mut(id).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.retain(|&c| c != id);
        }
    }

    /// Remove `id` and its whole subtree and release the drawables' GPU
    /// resources. Returns the number of removed nodes.
    ///
    /// The subtree is removed even when a release fails; the first failure is returned.
    pub fn remove(&mut self, id: NodeId, ctx: &mut dyn GraphicsContext) -> Result<usize> {
        self.node(id)?;
        self.detach(id);
        let mut stack = vec![id];
        let mut removed = 0;
        let mut released = Ok(());
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.remove(id) else {
                continue;
            };
            stack.extend(node.children);
            if let Some(drawable) = node.drawable {
                let result = drawable.release(ctx);
                if released.is_ok() {
                    released = result;
                }
            }
            removed += 1;
        }
        released.map(|()| removed)
    }

    /// Remove every node and release every drawable.
    pub fn clear(&mut self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        let roots: Vec<_> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(id, _)| id)
            .collect();
        let mut released = Ok(());
        for root in roots {
            let result = self.remove(root, ctx);
            if released.is_ok() {
                released = result.map(drop);
            }
        }
        released
    }

    /// Node ids below and including `root` in pre-order, children in insertion order.
    pub fn traverse(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        if !self.contains(root) {
            return order;
        }
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        order
    }

    /// Recompute world transforms below `root`.
    ///
    /// A top-level root's world transform is its local one. A `root` that has a
    /// parent is placed by the parent's world transform as of the last update.
    pub fn update_world_transforms(&mut self, root: NodeId) -> Result<()> {
        self.node(root)?;
        let parent_world = self
            .parent(root)
            .and_then(|p| self.nodes.get(p))
            .map_or_else(Transform::new, |p| p.world);
        let mut stack = vec![(root, parent_world)];
        while let Some((id, parent_world)) = stack.pop() {
            let node = &mut self.nodes[id];
            node.world = &parent_world * &node.local;
            let world = node.world;
            stack.extend(node.children.iter().rev().map(|&c| (c, world)));
        }
        Ok(())
    }

    /// Recompute world transforms and push the frame's uniforms into the program
    /// of every drawable node below `root`.
    pub fn update(
        &mut self,
        root: NodeId,
        ctx: &mut dyn GraphicsContext,
        frame: &FrameUniforms<'_>,
    ) -> Result<()> {
        self.update_world_transforms(root)?;
        let view = frame.camera.view_matrix();
        let mut without_program = 0;
        for id in self.traverse(root) {
            let node = &self.nodes[id];
            let Some(drawable) = node.drawable.as_deref() else {
                continue;
            };
            let Some(program) = node.program else {
                without_program += 1;
                continue;
            };
            drawable.bind(ctx)?;
            ctx.use_program(program)?;
            ctx.set_uniform("model", (*node.world.matrix()).into())?;
            ctx.set_uniform("view", view.into())?;
            ctx.set_uniform("projection", frame.projection.into())?;
            for (name, slot) in drawable.sampler_uniforms() {
                optional(ctx.set_uniform(name, Uniform::Int(slot)))?;
            }
            for (i, light) in frame.lights.iter().enumerate() {
                optional(light.upload(ctx, i, frame.camera))?;
            }
        }
        if without_program > 0 {
            log::warn!("{without_program} drawable node(s) have no shader program and are skipped");
        }
        Ok(())
    }

    /// Draw every node below `root` in pre-order.
    pub fn draw(&self, root: NodeId, ctx: &mut dyn GraphicsContext) -> Result<()> {
        self.node(root)?;
        for id in self.traverse(root) {
            let node = &self.nodes[id];
            let Some(program) = node.program else {
                continue;
            };
            ctx.use_program(program)?;
            ctx.set_uniform("model", (*node.world.matrix()).into())?;
            if let Some(drawable) = node.drawable.as_deref() {
                drawable.render(ctx)?;
            }
        }
        Ok(())
    }
}

/// Programs may leave out samplers and lights they do not use.
fn optional(result: Result<()>) -> Result<()> {
    match result {
        Err(SceneError::ShaderUniformNotFound { program, uniform }) => {
            log::debug!("program `{program}` does not use `{uniform}`");
            Ok(())
        }
        other => other,
    }
}

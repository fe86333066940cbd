//! In-memory object graph consumed by the flattener.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Each node has a
//! local transform, an exclusion layer, an active flag and at most one
//! renderable component.

pub mod animation;
pub mod mesh;
pub mod skin;

pub use animation::{AnimationClip, Animator, ClipInfo, Keyframe, PoseProvider, Track};
pub use mesh::{Mesh, Vertex};
pub use skin::{BakeError, BoneWeight, SkinnedMesh};

use std::sync::Arc;

use crate::material::Material;
use crate::math::{Mat4, Transform};

/// Stable identity of a node within its [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Static geometry plus its optional renderer binding.
#[derive(Debug, Clone, Default)]
pub struct MeshRenderer {
    pub mesh: Option<Arc<Mesh>>,
    /// Per-submesh materials. `None` means the node has geometry but
    /// no renderer to draw it with.
    pub materials: Option<Vec<Option<Arc<Material>>>>,
}

impl MeshRenderer {
    pub fn new(mesh: Arc<Mesh>, materials: Vec<Option<Arc<Material>>>) -> Self {
        Self {
            mesh: Some(mesh),
            materials: Some(materials),
        }
    }
}

/// Skinned geometry and the materials it renders with.
#[derive(Debug, Clone, Default)]
pub struct SkinnedMeshRenderer {
    pub skin: Option<Arc<SkinnedMesh>>,
    pub materials: Vec<Option<Arc<Material>>>,
}

impl SkinnedMeshRenderer {
    pub fn new(skin: Arc<SkinnedMesh>, materials: Vec<Option<Arc<Material>>>) -> Self {
        Self {
            skin: Some(skin),
            materials,
        }
    }
}

/// The renderable part of a node, dispatched by geometry kind.
#[derive(Debug, Clone)]
pub enum Component {
    Mesh(MeshRenderer),
    Skinned(SkinnedMeshRenderer),
}

/// A node of the object graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub local: Transform,
    pub layer: u32,
    pub active: bool,
    pub component: Option<Component>,
}

/// Arena of nodes forming one or more hierarchies.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    nodes: Vec<Node>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node without a parent.
    pub fn add_root(&mut self, name: impl Into<String>, local: Transform) -> NodeId {
        self.push(name.into(), None, local)
    }

    /// Adds a node under `parent`. The parent must belong to this scene.
    pub fn add_child(&mut self, parent: NodeId, name: impl Into<String>, local: Transform) -> NodeId {
        let parent_layer = self.node(parent).map(|p| p.layer).unwrap_or_default();
        let id = self.push(name.into(), Some(parent), local);
        self.nodes[id.0].layer = parent_layer;
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.push(id);
        }
        id
    }

    fn push(&mut self, name: String, parent: Option<NodeId>, local: Transform) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name,
            parent,
            children: Vec::new(),
            local,
            layer: 0,
            active: true,
            component: None,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    /// Attaches a component, replacing any previous one.
    pub fn set_component(&mut self, id: NodeId, component: Component) {
        if let Some(node) = self.node_mut(id) {
            node.component = Some(component);
        }
    }

    pub fn set_layer(&mut self, id: NodeId, layer: u32) {
        if let Some(node) = self.node_mut(id) {
            node.layer = layer;
        }
    }

    pub fn set_active(&mut self, id: NodeId, active: bool) {
        if let Some(node) = self.node_mut(id) {
            node.active = active;
        }
    }

    pub fn set_local(&mut self, id: NodeId, local: Transform) {
        if let Some(node) = self.node_mut(id) {
            node.local = local;
        }
    }

    /// First node with the given name, in insertion order.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    /// Local-to-world matrix, or `None` for an unknown node.
    pub fn world_matrix(&self, id: NodeId) -> Option<Mat4> {
        let mut node = self.node(id)?;
        let mut matrix = node.local.to_matrix();
        // Parent links form a tree; the bound guards against malformed cycles.
        for _ in 0..self.nodes.len() {
            let Some(parent) = node.parent else {
                return Some(matrix);
            };
            node = self.node(parent)?;
            matrix = node.local.to_matrix() * matrix;
        }
        None
    }

    /// The root and all its descendants in depth-first pre-order,
    /// inactive nodes included.
    pub fn descendants(&self, root: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack = if self.node(root).is_some() { vec![root] } else { Vec::new() };
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            if let Some(node) = self.node(id) {
                stack.extend(node.children.iter().rev().copied());
            }
            Some(id)
        })
    }
}

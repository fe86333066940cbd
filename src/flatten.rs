//! Flattens an object hierarchy into a list of drawable nodes.
//!
//! The flattener walks the root's full hierarchy (inactive nodes included)
//! once per geometry kind: static meshes first, then skinned meshes. Every
//! node it declines is reported as a [`NodeDiagnostic`] instead of aborting
//! the pass.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use crate::material::Material;
use crate::math::{Mat4, invert_or_identity};
use crate::scene::{Component, Mesh, NodeId, Scene};

/// Which geometry a traversal collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Static,
    Skinned,
}

/// One drawable node, positioned relative to the root and then by the config placement.
#[derive(Debug, Clone)]
pub struct RenderableNode {
    pub node: NodeId,
    pub kind: GeometryKind,
    /// For skinned nodes this is the baked pose, not the rest mesh.
    pub geometry: Arc<Mesh>,
    pub materials: Vec<Option<Arc<Material>>>,
    pub transform: Mat4,
    pub layer: u32,
}

/// Why a node was left out of the flattened output.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    ExcludedLayer(u32),
    NoGeometry,
    NoRenderer,
    BakeFailed(String),
    InvalidTransform,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeDiagnostic {
    pub node: NodeId,
    pub reason: SkipReason,
}

/// Output of a flatten call.
#[derive(Debug, Clone, Default)]
pub struct Flattened {
    pub nodes: Vec<RenderableNode>,
    pub diagnostics: Vec<NodeDiagnostic>,
}

impl Flattened {
    /// Appends another result, keeping order.
    pub fn extend(&mut self, other: Flattened) {
        self.nodes.extend(other.nodes);
        self.diagnostics.extend(other.diagnostics);
    }

    /// The skip reason recorded for a node, if any.
    pub fn skip_reason(&self, node: NodeId) -> Option<&SkipReason> {
        self.diagnostics.iter().find(|d| d.node == node).map(|d| &d.reason)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.iter().any(|n| n.node == node)
    }
}

/// Walks hierarchies and owns the cache of baked skinned meshes.
#[derive(Debug, Default)]
pub struct Flattener {
    bakes: HashMap<NodeId, Arc<Mesh>>,
}

impl Flattener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects static and skinned geometry under `root`.
    pub fn flatten(&mut self, scene: &Scene, root: NodeId, excluded_layers: &[u32], placement: &Mat4) -> Flattened {
        let mut out = self.flatten_kind(scene, root, excluded_layers, placement, GeometryKind::Static);
        out.extend(self.flatten_kind(scene, root, excluded_layers, placement, GeometryKind::Skinned));
        out
    }

    /// Collects geometry of a single kind under `root`.
    pub fn flatten_kind(
        &mut self,
        scene: &Scene,
        root: NodeId,
        excluded_layers: &[u32],
        placement: &Mat4,
        kind: GeometryKind,
    ) -> Flattened {
        let mut out = Flattened::default();
        let Some(root_world) = scene.world_matrix(root) else {
            warn!("flatten root {root:?} is not in the scene");
            return out;
        };
        let to_root = placement * invert_or_identity(&root_world);

        for id in scene.descendants(root) {
            let Some(node) = scene.node(id) else { continue };
            let result = match (&node.component, kind) {
                (Some(Component::Mesh(_)), GeometryKind::Static) | (Some(Component::Skinned(_)), GeometryKind::Skinned) => {
                    self.visit(scene, id, excluded_layers, &to_root)
                }
                _ => continue,
            };
            match result {
                Ok(renderable) => out.nodes.push(renderable),
                Err(reason) => {
                    match &reason {
                        SkipReason::BakeFailed(e) => warn!("skipping `{}`: bake failed: {e}", node.name),
                        SkipReason::InvalidTransform => warn!("skipping `{}`: no world transform", node.name),
                        other => debug!("skipping `{}`: {other:?}", node.name),
                    }
                    out.diagnostics.push(NodeDiagnostic { node: id, reason });
                }
            }
        }
        debug!(
            "flattened {kind:?} geometry under {root:?}: {} drawn, {} skipped",
            out.nodes.len(),
            out.diagnostics.len()
        );
        out
    }

    fn visit(&mut self, scene: &Scene, id: NodeId, excluded_layers: &[u32], to_root: &Mat4) -> Result<RenderableNode, SkipReason> {
        let node = scene.node(id).ok_or(SkipReason::InvalidTransform)?;
        if excluded_layers.contains(&node.layer) {
            return Err(SkipReason::ExcludedLayer(node.layer));
        }
        let world = scene.world_matrix(id).ok_or(SkipReason::InvalidTransform)?;
        let transform = to_root * world;

        let (kind, geometry, materials) = match &node.component {
            Some(Component::Mesh(renderer)) => {
                let mesh = renderer.mesh.as_ref().ok_or(SkipReason::NoGeometry)?;
                let materials = renderer.materials.as_ref().ok_or(SkipReason::NoRenderer)?;
                (GeometryKind::Static, Arc::clone(mesh), materials.clone())
            }
            Some(Component::Skinned(renderer)) => {
                let skin = renderer.skin.as_ref().ok_or(SkipReason::NoGeometry)?;
                let baked = self.bakes.entry(id).or_default();
                skin.bake_into(scene, id, Arc::make_mut(baked))
                    .map_err(|e| SkipReason::BakeFailed(e.to_string()))?;
                (GeometryKind::Skinned, Arc::clone(baked), renderer.materials.clone())
            }
            None => return Err(SkipReason::NoGeometry),
        };

        Ok(RenderableNode {
            node: id,
            kind,
            geometry,
            materials,
            transform,
            layer: node.layer,
        })
    }

    /// Number of cached bakes.
    pub fn cached_bakes(&self) -> usize {
        self.bakes.len()
    }

    /// Drops the cached bake of one node.
    pub fn invalidate_bake(&mut self, node: NodeId) {
        self.bakes.remove(&node);
    }

    /// Drops every cached bake, e.g. after the pose changed or the scene was replaced.
    pub fn invalidate_bakes(&mut self) {
        self.bakes.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

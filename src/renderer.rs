//! Renderer variants that turn a hierarchy into draw calls.
//!
//! Each variant handles one kind of geometry, carries its own excluded
//! layers, and contributes [`DrawCall`]s with resolved materials:
//!
//! - [`IconRenderer::Mesh`]: static meshes
//! - [`IconRenderer::SkinnedMesh`]: skinned meshes, baked to the current pose
//! - [`IconRenderer::Animator`]: samples the config's pose, then both of the above

use std::sync::Arc;

use log::{debug, trace};

use crate::config::RenderConfig;
use crate::flatten::{Flattened, Flattener, GeometryKind, NodeDiagnostic};
use crate::material::{Material, MaterialOverrideMap, MaterialSubstitutionTable, resolve};
use crate::math::Mat4;
use crate::scene::animation::apply_pose;
use crate::scene::{Mesh, NodeId, PoseProvider, Scene};

/// One submesh submission with its final material and transform.
#[derive(Debug, Clone)]
pub struct DrawCall {
    /// Node the geometry came from.
    pub node: NodeId,
    /// Geometry to draw; the baked pose for skinned nodes.
    pub mesh: Arc<Mesh>,
    /// Index of the submesh within `mesh`.
    pub submesh: usize,
    /// Material after overrides and substitutions.
    pub material: Arc<Material>,
    /// Model matrix, relative to the subject root with the config placement applied.
    pub transform: Mat4,
}

/// Draw calls collected for one pass, plus what was left out.
#[derive(Debug, Clone, Default)]
pub struct DrawList {
    /// Calls in submission order.
    pub calls: Vec<DrawCall>,
    /// Nodes the flattener skipped, with the reason.
    pub diagnostics: Vec<NodeDiagnostic>,
    /// Submeshes dropped because they had no material.
    pub skipped_submeshes: usize,
}

impl DrawList {
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Everything a renderer variant needs for one contribution.
pub struct ContributeContext<'a> {
    /// Scene holding the subject. Mutable so a pose can be applied.
    pub scene: &'a mut Scene,
    /// Root of the subject hierarchy.
    pub root: NodeId,
    pub config: &'a RenderConfig,
    /// Source of the config's pose, if the subject is animated.
    pub poses: Option<&'a dyn PoseProvider>,
    /// Per-renderable override materials for this subject.
    pub overrides: &'a MaterialOverrideMap,
    pub substitutions: &'a MaterialSubstitutionTable,
    /// Selects the faction mask column of the substitution table.
    pub faction_mask: bool,
    /// Flattener owning the skinned bake cache.
    pub flattener: &'a mut Flattener,
}

/// Closed set of renderer variants, dispatched by geometry kind.
#[derive(Debug, Clone, PartialEq)]
pub enum IconRenderer {
    /// Static meshes only.
    Mesh {
        /// Layers whose nodes are never drawn.
        excluded_layers: Vec<u32>,
    },
    /// Skinned meshes only, baked to their current pose.
    SkinnedMesh {
        /// Layers whose nodes are never drawn.
        excluded_layers: Vec<u32>,
    },
    /// Applies the config's pose, then draws static and skinned meshes.
    Animator {
        /// Layers whose nodes are never drawn.
        excluded_layers: Vec<u32>,
    },
}

impl IconRenderer {
    pub fn mesh(excluded_layers: Vec<u32>) -> Self {
        Self::Mesh { excluded_layers }
    }

    pub fn skinned_mesh(excluded_layers: Vec<u32>) -> Self {
        Self::SkinnedMesh { excluded_layers }
    }

    pub fn animator(excluded_layers: Vec<u32>) -> Self {
        Self::Animator { excluded_layers }
    }

    pub fn excluded_layers(&self) -> &[u32] {
        match self {
            Self::Mesh { excluded_layers }
            | Self::SkinnedMesh { excluded_layers }
            | Self::Animator { excluded_layers } => excluded_layers,
        }
    }

    /// Appends this variant's draw calls for the context's root.
    pub fn contribute(&self, ctx: &mut ContributeContext<'_>, out: &mut DrawList) {
        let excluded = self.excluded_layers();
        let placement = ctx.config.placement();

        let flattened = match self {
            Self::Mesh { .. } => {
                ctx.flattener
                    .flatten_kind(ctx.scene, ctx.root, excluded, &placement, GeometryKind::Static)
            }
            Self::SkinnedMesh { .. } => {
                ctx.flattener
                    .flatten_kind(ctx.scene, ctx.root, excluded, &placement, GeometryKind::Skinned)
            }
            Self::Animator { .. } => {
                if let (Some(selector), Some(poses)) = (ctx.config.pose(), ctx.poses) {
                    apply_pose(poses, ctx.scene, selector);
                }
                ctx.flattener.flatten(ctx.scene, ctx.root, excluded, &placement)
            }
        };

        append_draws(flattened, ctx.overrides, ctx.substitutions, ctx.faction_mask, out);
    }
}

/// Resolves materials for flattened nodes and appends one call per drawable submesh.
pub fn append_draws(
    flattened: Flattened,
    overrides: &MaterialOverrideMap,
    substitutions: &MaterialSubstitutionTable,
    faction_mask: bool,
    out: &mut DrawList,
) {
    for renderable in flattened.nodes {
        let resolved = resolve(
            renderable.node,
            &renderable.materials,
            renderable.geometry.submesh_count(),
            overrides,
            substitutions,
            faction_mask,
        );
        for (submesh, material) in resolved.into_iter().enumerate() {
            let Some(material) = material else {
                debug!("{:?} submesh {submesh} has no material, not drawn", renderable.node);
                out.skipped_submeshes += 1;
                continue;
            };
            trace!("draw {:?} submesh {submesh} with `{}`", renderable.node, material.name);
            out.calls.push(DrawCall {
                node: renderable.node,
                mesh: Arc::clone(&renderable.geometry),
                submesh,
                material,
                transform: renderable.transform,
            });
        }
    }
    out.diagnostics.extend(flattened.diagnostics);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoseSelector;
    use crate::material::MaterialId;
    use crate::math::{Transform, Vec3};
    use crate::scene::{
        AnimationClip, Animator, Component, Keyframe, MeshRenderer, SkinnedMesh, SkinnedMeshRenderer, Track,
    };
    use palette::Srgb;

    struct Fixture {
        scene: Scene,
        root: NodeId,
        prop: NodeId,
        body: NodeId,
        bone: NodeId,
    }

    fn fixture() -> Fixture {
        let stone = Material::new(1, "stone", Srgb::new(0.5, 0.5, 0.5)).shared();
        let wood = Material::new(2, "wood", Srgb::new(0.6, 0.4, 0.2)).shared();
        let cloth = Material::new(3, "cloth", Srgb::new(0.8, 0.1, 0.1)).shared();

        let mut scene = Scene::new();
        let root = scene.add_root("root", Transform::identity());
        let prop = scene.add_child(root, "prop", Transform::identity());
        let mesh = Arc::new(Mesh::cuboid("prop", Vec3::new(0.5, 0.5, 0.5)).split_submeshes(2));
        scene.set_component(prop, Component::Mesh(MeshRenderer::new(mesh, vec![Some(stone), Some(wood)])));

        let body = scene.add_child(root, "body", Transform::identity());
        let bone = scene.add_child(root, "bone", Transform::identity());
        let rest = Arc::new(Mesh::quad("cape", 0.5));
        let skin = SkinnedMesh::bind_rigid(&scene, body, rest, bone);
        scene.set_component(body, Component::Skinned(SkinnedMeshRenderer::new(Arc::new(skin), vec![Some(cloth)])));

        Fixture {
            scene,
            root,
            prop,
            body,
            bone,
        }
    }

    fn run(renderer: &IconRenderer, f: &mut Fixture, config: &RenderConfig, poses: Option<&dyn PoseProvider>) -> DrawList {
        let mut flattener = Flattener::new();
        let overrides = MaterialOverrideMap::new();
        let table = MaterialSubstitutionTable::new();
        let mut ctx = ContributeContext {
            scene: &mut f.scene,
            root: f.root,
            config,
            poses,
            overrides: &overrides,
            substitutions: &table,
            faction_mask: false,
            flattener: &mut flattener,
        };
        let mut out = DrawList::default();
        renderer.contribute(&mut ctx, &mut out);
        out
    }

    #[test]
    fn mesh_variant_draws_each_submesh() {
        let mut f = fixture();
        let out = run(&IconRenderer::mesh(vec![]), &mut f, &RenderConfig::default(), None);
        let draws: Vec<_> = out.calls.iter().map(|c| (c.node, c.submesh, c.material.id)).collect();
        assert_eq!(draws, vec![(f.prop, 0, MaterialId(1)), (f.prop, 1, MaterialId(2))]);
    }

    #[test]
    fn skinned_variant_draws_only_skinned_geometry() {
        let mut f = fixture();
        let out = run(&IconRenderer::skinned_mesh(vec![]), &mut f, &RenderConfig::default(), None);
        assert_eq!(out.calls.len(), 1);
        assert_eq!(out.calls[0].node, f.body);
    }

    #[test]
    fn animator_variant_applies_pose_before_flattening() {
        let mut f = fixture();
        let animator = Animator::new(vec![AnimationClip::new(
            "lift",
            30.0,
            1.0,
            vec![Track::new(
                f.bone,
                vec![
                    Keyframe::new(0.0, Transform::identity()),
                    Keyframe::new(1.0, Transform::from_position(Vec3::new(0.0, 2.0, 0.0))),
                ],
            )],
        )]);
        let mut config = RenderConfig::default();
        config.set_pose(Some(PoseSelector::new(0, 30)));

        let out = run(&IconRenderer::animator(vec![]), &mut f, &config, Some(&animator));
        assert_eq!(out.calls.len(), 3);
        let cape = out.calls.iter().find(|c| c.node == f.body).unwrap();
        let rest_y = -0.5;
        assert!((cape.mesh.vertices[0].position.y - (rest_y + 2.0)).abs() < 1e-4);
    }

    #[test]
    fn excluded_layers_apply_per_variant() {
        let mut f = fixture();
        f.scene.set_layer(f.prop, 3);
        let out = run(&IconRenderer::animator(vec![3]), &mut f, &RenderConfig::default(), None);
        assert!(out.calls.iter().all(|c| c.node != f.prop));
        assert_eq!(out.diagnostics.len(), 1);
    }

    #[test]
    fn submeshes_without_material_are_counted() {
        let mut f = fixture();
        if let Some(Component::Mesh(renderer)) = &mut f.scene.node_mut(f.prop).unwrap().component {
            renderer.materials = Some(vec![Some(Material::new(1, "stone", Srgb::new(0.5, 0.5, 0.5)).shared()), None]);
        }
        let out = run(&IconRenderer::mesh(vec![]), &mut f, &RenderConfig::default(), None);
        assert_eq!(out.calls.len(), 1);
        assert_eq!(out.skipped_submeshes, 1);
    }
}

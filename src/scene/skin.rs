//! Skinned meshes and pose baking.

use std::sync::Arc;

use thiserror::Error;

use super::{Mesh, NodeId, Scene, Vertex};
use crate::math::{Mat4, Point3, Vec3, invert_or_identity};

/// Influence of one bone on a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoneWeight {
    pub bone: u16,
    pub weight: f32,
}

impl BoneWeight {
    pub fn new(bone: u16, weight: f32) -> Self {
        Self { bone, weight }
    }
}

/// Why a skinned mesh could not be baked.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BakeError {
    #[error("{weights} weight sets for {vertices} vertices")]
    WeightCount { weights: usize, vertices: usize },

    #[error("{bones} bones but {bind_poses} bind poses")]
    BindPoseCount { bones: usize, bind_poses: usize },

    #[error("vertex {vertex} references bone {bone} of {bones}")]
    BoneOutOfRange { vertex: usize, bone: u16, bones: usize },

    #[error("bone node {0:?} is not in the scene")]
    MissingBone(NodeId),

    #[error("skinned node {0:?} is not in the scene")]
    MissingNode(NodeId),
}

/// A rest-pose mesh deformed by scene nodes acting as bones.
#[derive(Debug, Clone, PartialEq)]
pub struct SkinnedMesh {
    pub rest: Arc<Mesh>,
    pub bones: Vec<NodeId>,
    /// Maps mesh space to each bone's space at bind time.
    pub inverse_bind: Vec<Mat4>,
    /// Up to four influences per vertex.
    pub weights: Vec<[BoneWeight; 4]>,
}

impl SkinnedMesh {
    /// Binds every vertex fully to one bone, using the scene's current pose
    /// as the bind pose.
    pub fn bind_rigid(scene: &Scene, skinned_node: NodeId, rest: Arc<Mesh>, bone: NodeId) -> Self {
        let mesh_world = scene.world_matrix(skinned_node).unwrap_or_else(Mat4::identity);
        let bone_world = scene.world_matrix(bone).unwrap_or_else(Mat4::identity);
        let mut full = [BoneWeight::default(); 4];
        full[0] = BoneWeight::new(0, 1.0);
        Self {
            weights: vec![full; rest.vertices.len()],
            rest,
            bones: vec![bone],
            inverse_bind: vec![invert_or_identity(&bone_world) * mesh_world],
        }
    }

    pub fn submesh_count(&self) -> usize {
        self.rest.submesh_count()
    }

    fn validate(&self) -> Result<(), BakeError> {
        if self.weights.len() != self.rest.vertices.len() {
            return Err(BakeError::WeightCount {
                weights: self.weights.len(),
                vertices: self.rest.vertices.len(),
            });
        }
        if self.bones.len() != self.inverse_bind.len() {
            return Err(BakeError::BindPoseCount {
                bones: self.bones.len(),
                bind_poses: self.inverse_bind.len(),
            });
        }
        for (vertex, influences) in self.weights.iter().enumerate() {
            for w in influences.iter().filter(|w| w.weight > 0.0) {
                if w.bone as usize >= self.bones.len() {
                    return Err(BakeError::BoneOutOfRange {
                        vertex,
                        bone: w.bone,
                        bones: self.bones.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Bakes the current pose into `out`, in the skinned node's local space.
    ///
    /// `out` keeps its allocations between calls.
    pub fn bake_into(&self, scene: &Scene, skinned_node: NodeId, out: &mut Mesh) -> Result<(), BakeError> {
        self.validate()?;

        let mesh_world = scene
            .world_matrix(skinned_node)
            .ok_or(BakeError::MissingNode(skinned_node))?;
        let world_to_mesh = invert_or_identity(&mesh_world);

        let skin_matrices = self
            .bones
            .iter()
            .zip(&self.inverse_bind)
            .map(|(&bone, inverse_bind)| {
                let bone_world = scene.world_matrix(bone).ok_or(BakeError::MissingBone(bone))?;
                Ok(world_to_mesh * bone_world * inverse_bind)
            })
            .collect::<Result<Vec<Mat4>, BakeError>>()?;

        out.name.clone_from(&self.rest.name);
        out.submeshes.clone_from(&self.rest.submeshes);
        out.vertices.clear();
        out.vertices.extend(self.rest.vertices.iter().zip(&self.weights).map(|(v, influences)| {
            let mut position = Vec3::zeros();
            let mut normal = Vec3::zeros();
            let mut total = 0.0;
            for w in influences.iter().filter(|w| w.weight > 0.0) {
                let m = &skin_matrices[w.bone as usize];
                position += m.transform_point(&Point3::from(v.position)).coords * w.weight;
                normal += m.transform_vector(&v.normal) * w.weight;
                total += w.weight;
            }
            if total <= f32::EPSILON {
                return *v;
            }
            Vertex::new(position / total, normal.try_normalize(f32::EPSILON).unwrap_or(v.normal))
        }));
        Ok(())
    }
}

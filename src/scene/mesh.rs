//! Triangle meshes split into submeshes.

use crate::math::Vec3;

/// A mesh vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self { position, normal }
    }
}

/// Indexed triangle mesh. Each submesh is its own triangle list and is
/// drawn with its own material.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub submeshes: Vec<Vec<u32>>,
}

impl Mesh {
    pub fn new(name: impl Into<String>, vertices: Vec<Vertex>, submeshes: Vec<Vec<u32>>) -> Self {
        Self {
            name: name.into(),
            vertices,
            submeshes,
        }
    }

    pub fn submesh_count(&self) -> usize {
        self.submeshes.len()
    }

    /// Triangles of a submesh as vertex triples.
    ///
    /// Triangles referencing missing vertices are dropped.
    pub fn triangles(&self, submesh: usize) -> impl Iterator<Item = [Vertex; 3]> + '_ {
        self.submeshes
            .get(submesh)
            .map(|indices| indices.as_slice())
            .unwrap_or_default()
            .chunks_exact(3)
            .filter_map(|tri| {
                let v = |i: u32| self.vertices.get(i as usize).copied();
                Some([v(tri[0])?, v(tri[1])?, v(tri[2])?])
            })
    }

    /// Axis-aligned box centered on the origin, one submesh.
    pub fn cuboid(name: impl Into<String>, half_extents: Vec3) -> Self {
        let h = half_extents;
        // (normal, tangent u, tangent v) per face
        let faces = [
            (Vec3::x(), Vec3::y(), Vec3::z()),
            (-Vec3::x(), Vec3::z(), Vec3::y()),
            (Vec3::y(), Vec3::z(), Vec3::x()),
            (-Vec3::y(), Vec3::x(), Vec3::z()),
            (Vec3::z(), Vec3::x(), Vec3::y()),
            (-Vec3::z(), Vec3::y(), Vec3::x()),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (n, u, v) in faces {
            let base = vertices.len() as u32;
            let center = n.component_mul(&h);
            let du = u.component_mul(&h);
            let dv = v.component_mul(&h);
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                vertices.push(Vertex::new(center + du * su + dv * sv, n));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::new(name, vertices, vec![indices])
    }

    /// Square in the XY plane facing -Z, one submesh.
    pub fn quad(name: impl Into<String>, half_size: f32) -> Self {
        let n = -Vec3::z();
        let vertices = vec![
            Vertex::new(Vec3::new(-half_size, -half_size, 0.0), n),
            Vertex::new(Vec3::new(half_size, -half_size, 0.0), n),
            Vertex::new(Vec3::new(half_size, half_size, 0.0), n),
            Vertex::new(Vec3::new(-half_size, half_size, 0.0), n),
        ];
        Self::new(name, vertices, vec![vec![0, 1, 2, 0, 2, 3]])
    }

    /// Regroups all triangles into `count` contiguous submeshes.
    pub fn split_submeshes(mut self, count: usize) -> Self {
        let count = count.max(1);
        let triangles: Vec<u32> = self.submeshes.concat();
        let tri_count = triangles.len() / 3;
        let per = tri_count.div_ceil(count).max(1);
        let mut chunks: Vec<Vec<u32>> = triangles.chunks(per * 3).map(<[u32]>::to_vec).collect();
        chunks.resize(count, Vec::new());
        self.submeshes = chunks;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuboid_has_twelve_triangles() {
        let mesh = Mesh::cuboid("box", Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.submesh_count(), 1);
        assert_eq!(mesh.triangles(0).count(), 12);
        assert!(mesh.vertices.iter().all(|v| v.position.y.abs() <= 2.0));
    }

    #[test]
    fn split_keeps_every_triangle() {
        let mesh = Mesh::cuboid("box", Vec3::new(1.0, 1.0, 1.0)).split_submeshes(2);
        assert_eq!(mesh.submesh_count(), 2);
        assert_eq!(mesh.triangles(0).count() + mesh.triangles(1).count(), 12);
    }

    #[test]
    fn out_of_range_indices_are_dropped() {
        let mut mesh = Mesh::quad("q", 1.0);
        mesh.submeshes[0].extend_from_slice(&[0, 1, 99]);
        assert_eq!(mesh.triangles(0).count(), 2);
        assert_eq!(mesh.triangles(5).count(), 0);
    }
}

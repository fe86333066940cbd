//! CPU rasterizer implementing [`RenderBackend`].
//!
//! Depth-tested triangle rasterization with perspective-correct normals and
//! Lambert shading from the frame's two directional lights plus a constant
//! ambient term. Triangles are clipped against the near plane. No culling,
//! fog, shadows or post-processing.

use image::Rgb32FImage;
use log::{debug, trace};

use super::{FrameSetup, RenderBackend};
use crate::error::{IconError, Result};
use crate::icon::RawRenderBuffer;
use crate::material::Material;
use crate::math::{Matrix3, Vec3, Vector4};
use crate::renderer::DrawCall;

/// Largest target the rasterizer allocates by default (4096 x 4096).
pub const DEFAULT_MAX_PIXELS: u64 = 4096 * 4096;

/// A vertex after projection to screen space.
#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    /// NDC depth in `[-1, 1]`.
    z: f32,
    inv_w: f32,
    normal: Vec3,
}

/// A vertex in clip space, before the perspective divide.
#[derive(Debug, Clone, Copy)]
struct ClipVertex {
    clip: Vector4<f32>,
    normal: Vec3,
}

/// Clips a triangle against the near plane (`z >= -w`).
///
/// Returns the clipped convex polygon and its vertex count: 0 when fully
/// behind, 3 or 4 otherwise.
fn clip_near(tri: &[ClipVertex; 3]) -> ([ClipVertex; 4], usize) {
    let distance = |v: &ClipVertex| v.clip.z + v.clip.w;
    let mut out = [tri[0]; 4];
    let mut count = 0;
    for i in 0..3 {
        let (a, b) = (&tri[i], &tri[(i + 1) % 3]);
        let (da, db) = (distance(a), distance(b));
        if da >= 0.0 {
            out[count] = *a;
            count += 1;
        }
        if (da >= 0.0) != (db >= 0.0) {
            let t = da / (da - db);
            out[count] = ClipVertex {
                clip: a.clip.lerp(&b.clip, t),
                normal: a.normal.lerp(&b.normal, t),
            };
            count += 1;
        }
    }
    (out, count)
}

/// Row-major index into a square target, computed without `u32` overflow.
fn pixel_index(size: u32, x: u32, y: u32) -> usize {
    y as usize * size as usize + x as usize
}

/// Software backend with reusable color and depth targets.
#[derive(Debug)]
pub struct SoftwareRasterizer {
    color: Vec<[f32; 3]>,
    depth: Vec<f32>,
    size: u32,
    max_pixels: u64,
    allocations: usize,
}

impl Default for SoftwareRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareRasterizer {
    pub fn new() -> Self {
        Self::with_max_pixels(DEFAULT_MAX_PIXELS)
    }

    /// Creates a rasterizer that refuses targets larger than `max_pixels`.
    pub fn with_max_pixels(max_pixels: u64) -> Self {
        Self {
            color: Vec::new(),
            depth: Vec::new(),
            size: 0,
            max_pixels,
            allocations: 0,
        }
    }

    /// Side length of the currently allocated targets, 0 if none.
    pub fn target_size(&self) -> u32 {
        self.size
    }

    /// How many times targets were (re)allocated.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    fn ensure_targets(&mut self, size: u32) -> Result<()> {
        if size == 0 {
            return Err(IconError::InvalidResolution {
                width: size,
                height: size,
            });
        }
        let pixels = u64::from(size) * u64::from(size);
        if pixels > self.max_pixels {
            return Err(IconError::RenderBackendFailure(format!(
                "cannot allocate {size}x{size} target, limit is {} pixels",
                self.max_pixels
            )));
        }
        if self.size != size {
            debug!("allocating {size}x{size} software render target");
            let len = pixels as usize;
            self.color = vec![[0.0; 3]; len];
            self.depth = vec![f32::INFINITY; len];
            self.size = size;
            self.allocations += 1;
        }
        Ok(())
    }

    fn draw(&mut self, frame: &FrameSetup, view_projection: &crate::math::Mat4, call: &DrawCall) {
        let mvp = view_projection * call.transform;
        let normal_matrix: Matrix3<f32> = call
            .transform
            .fixed_view::<3, 3>(0, 0)
            .into_owned()
            .try_inverse()
            .map(|m| m.transpose())
            .unwrap_or_else(Matrix3::identity);
        let size = self.size as f32;

        let to_clip = |v: &crate::scene::Vertex| ClipVertex {
            clip: mvp * v.position.push(1.0),
            normal: normal_matrix * v.normal,
        };
        let to_screen = |v: &ClipVertex| {
            let inv_w = 1.0 / v.clip.w;
            ScreenVertex {
                x: (v.clip.x * inv_w + 1.0) * 0.5 * size,
                y: (1.0 - v.clip.y * inv_w) * 0.5 * size,
                z: v.clip.z * inv_w,
                inv_w,
                normal: v.normal,
            }
        };

        let mut drawn = 0usize;
        for tri in call.mesh.triangles(call.submesh) {
            let (polygon, count) = clip_near(&tri.map(|v| to_clip(&v)));
            for k in 1..count.saturating_sub(1) {
                let fan = [to_screen(&polygon[0]), to_screen(&polygon[k]), to_screen(&polygon[k + 1])];
                if self.fill_triangle(frame, &call.material, fan) {
                    drawn += 1;
                }
            }
        }
        trace!("{:?} submesh {}: {drawn} triangles", call.node, call.submesh);
    }

    fn fill_triangle(&mut self, frame: &FrameSetup, material: &Material, v: [ScreenVertex; 3]) -> bool {
        let edge = |a: &ScreenVertex, b: &ScreenVertex, px: f32, py: f32| (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x);
        let area = edge(&v[0], &v[1], v[2].x, v[2].y);
        if area.abs() <= f32::EPSILON {
            return false;
        }

        let max = self.size as f32 - 1.0;
        let min_x = v.iter().map(|p| p.x).fold(f32::INFINITY, f32::min).floor().max(0.0);
        let max_x = v.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max).ceil().min(max);
        let min_y = v.iter().map(|p| p.y).fold(f32::INFINITY, f32::min).floor().max(0.0);
        let max_y = v.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max).ceil().min(max);
        if min_x > max_x || min_y > max_y {
            return false;
        }

        for y in min_y as u32..=max_y as u32 {
            for x in min_x as u32..=max_x as u32 {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                let b0 = edge(&v[1], &v[2], px, py) / area;
                let b1 = edge(&v[2], &v[0], px, py) / area;
                let b2 = edge(&v[0], &v[1], px, py) / area;
                if b0 < 0.0 || b1 < 0.0 || b2 < 0.0 {
                    continue;
                }

                let z = b0 * v[0].z + b1 * v[1].z + b2 * v[2].z;
                let index = pixel_index(self.size, x, y);
                // Near plane is handled by clipping.
                if z > 1.0 || z >= self.depth[index] {
                    continue;
                }

                let (p0, p1, p2) = (b0 * v[0].inv_w, b1 * v[1].inv_w, b2 * v[2].inv_w);
                let sum = p0 + p1 + p2;
                let normal = (v[0].normal * p0 + v[1].normal * p1 + v[2].normal * p2) / sum;

                self.depth[index] = z;
                self.color[index] = shade(frame, material, &normal);
            }
        }
        true
    }
}

/// Lambert shading with a constant ambient term, clamped to `[0, 1]`.
fn shade(frame: &FrameSetup, material: &Material, normal: &Vec3) -> [f32; 3] {
    let n = normal.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::zeros);
    let mut light = [frame.ambient; 3];
    for l in &frame.lights {
        let lambert = n.dot(&-l.direction).max(0.0) * l.intensity;
        light[0] += l.color.red * lambert;
        light[1] += l.color.green * lambert;
        light[2] += l.color.blue * lambert;
    }
    let albedo = [material.base_color.red, material.base_color.green, material.base_color.blue];
    let emission = [material.emission.red, material.emission.green, material.emission.blue];
    [0, 1, 2].map(|i| (albedo[i] * light[i] + emission[i]).clamp(0.0, 1.0))
}

impl RenderBackend for SoftwareRasterizer {
    fn render(&mut self, frame: &FrameSetup, draws: &[DrawCall]) -> Result<RawRenderBuffer> {
        self.ensure_targets(frame.resolution)?;

        let bg = frame.background.color();
        self.color.fill([bg.red, bg.green, bg.blue]);
        self.depth.fill(f32::INFINITY);

        let view_projection = frame.camera.view_projection(1.0);
        for call in draws {
            self.draw(frame, &view_projection, call);
        }

        let data: Vec<f32> = self.color.iter().flatten().copied().collect();
        let image = Rgb32FImage::from_raw(self.size, self.size, data).ok_or_else(|| {
            IconError::RenderBackendFailure("color target does not match its declared size".into())
        })?;
        Ok(RawRenderBuffer::new(image, frame.background))
    }

    fn release(&mut self) {
        self.color = Vec::new();
        self.depth = Vec::new();
        self.size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Camera, DirectionalLight};
    use crate::icon::Background;
    use crate::math::{Mat4, euler_degrees};
    use crate::scene::{Mesh, NodeId};
    use palette::Srgb;
    use std::sync::Arc;

    fn frame(resolution: u32, background: Background) -> FrameSetup {
        let light = DirectionalLight {
            direction: Vec3::new(0.0, 0.0, 1.0),
            color: Srgb::new(1.0, 1.0, 1.0),
            intensity: 1.0,
        };
        FrameSetup {
            resolution,
            background,
            camera: Camera::icon_rig(30.0),
            lights: [light.clone(), light],
            ambient: 0.0,
        }
    }

    fn quad_call(color: Srgb<f32>, z: f32) -> DrawCall {
        DrawCall {
            node: NodeId(0),
            mesh: Arc::new(Mesh::quad("q", 1.0)),
            submesh: 0,
            material: Arc::new(Material::new(1, "m", color)),
            transform: Mat4::new_translation(&Vec3::new(0.0, 0.0, z)),
        }
    }

    #[test]
    fn empty_frame_is_background() {
        let mut backend = SoftwareRasterizer::new();
        let buf = backend.render(&frame(16, Background::White), &[]).unwrap();
        assert!(buf.image.pixels().all(|p| p.0 == [1.0, 1.0, 1.0]));
        assert_eq!(buf.background, Background::White);
    }

    #[test]
    fn quad_covers_center_and_is_lit() {
        let mut backend = SoftwareRasterizer::new();
        let buf = backend
            .render(&frame(32, Background::Black), &[quad_call(Srgb::new(0.25, 0.5, 0.5), 0.0)])
            .unwrap();
        let center = buf.image.get_pixel(16, 16).0;
        // Quad faces the camera, both lights shine straight onto it.
        assert!((center[0] - 0.5).abs() < 1e-4);
        assert!((center[1] - 1.0).abs() < 1e-4);
        assert_eq!(buf.image.get_pixel(0, 0).0, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn world_right_renders_on_screen_right() {
        let mut backend = SoftwareRasterizer::new();
        let call = DrawCall {
            mesh: Arc::new(Mesh::cuboid("c", Vec3::new(0.3, 0.3, 0.3))),
            transform: Mat4::new_translation(&Vec3::new(1.5, 0.0, 0.0)),
            ..quad_call(Srgb::new(1.0, 1.0, 1.0), 0.0)
        };
        let buf = backend.render(&frame(32, Background::Black), &[call]).unwrap();
        let lit = |range: std::ops::Range<u32>| {
            buf.image
                .enumerate_pixels()
                .filter(|(x, _, p)| range.contains(x) && p.0 != [0.0, 0.0, 0.0])
                .count()
        };
        assert_eq!(lit(0..16), 0);
        assert!(lit(16..32) > 0);
    }

    #[test]
    fn geometry_crossing_the_near_plane_is_clipped() {
        // A floor running from behind the camera to past the origin.
        let floor = DrawCall {
            mesh: Arc::new(Mesh::quad("floor", 20.0)),
            material: Arc::new(Material::new(2, "glow", Srgb::new(0.0, 0.0, 0.0)).with_emission(Srgb::new(1.0, 1.0, 1.0))),
            transform: euler_degrees(&Vec3::new(90.0, 0.0, 0.0)).to_homogeneous(),
            ..quad_call(Srgb::new(0.0, 0.0, 0.0), 0.0)
        };
        let mut backend = SoftwareRasterizer::new();
        let buf = backend.render(&frame(32, Background::Black), &[floor]).unwrap();
        assert_eq!(buf.image.get_pixel(16, 31).0, [1.0, 1.0, 1.0]);
        assert_eq!(buf.image.get_pixel(16, 0).0, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn triangle_fully_behind_camera_is_dropped() {
        let behind = |z: f32| ClipVertex {
            clip: Vector4::new(0.0, 0.0, z, -1.0),
            normal: Vec3::z(),
        };
        let (_, count) = clip_near(&[behind(0.5), behind(0.2), behind(0.9)]);
        assert_eq!(count, 0);
    }

    #[test]
    fn pixel_index_does_not_overflow_large_targets() {
        assert_eq!(pixel_index(70_000, 69_999, 69_999), 70_000usize * 70_000 - 1);
    }

    #[test]
    fn nearer_geometry_wins_depth_test() {
        let mut backend = SoftwareRasterizer::new();
        let far = quad_call(Srgb::new(0.5, 0.0, 0.0), 2.0);
        let near = quad_call(Srgb::new(0.0, 0.5, 0.0), -2.0);
        let buf = backend.render(&frame(32, Background::Black), &[near, far]).unwrap();
        let center = buf.image.get_pixel(16, 16).0;
        assert!(center[1] > 0.0 && center[0] == 0.0);
    }

    #[test]
    fn targets_are_reused_until_size_changes() {
        let mut backend = SoftwareRasterizer::new();
        backend.render(&frame(16, Background::Black), &[]).unwrap();
        backend.render(&frame(16, Background::White), &[]).unwrap();
        assert_eq!(backend.allocations(), 1);
        backend.render(&frame(32, Background::Black), &[]).unwrap();
        assert_eq!(backend.allocations(), 2);
        backend.release();
        assert_eq!(backend.target_size(), 0);
    }

    #[test]
    fn oversized_target_is_a_backend_failure() {
        let mut backend = SoftwareRasterizer::with_max_pixels(100);
        let err = backend.render(&frame(16, Background::Black), &[]).unwrap_err();
        assert!(matches!(err, IconError::RenderBackendFailure(_)));
        let err = backend.render(&frame(0, Background::Black), &[]).unwrap_err();
        assert!(matches!(err, IconError::InvalidResolution { .. }));
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut backend = SoftwareRasterizer::new();
        let call = quad_call(Srgb::new(0.3, 0.6, 0.9), 0.0);
        let a = backend.render(&frame(24, Background::Black), &[call.clone()]).unwrap();
        let b = backend.render(&frame(24, Background::Black), &[call]).unwrap();
        assert_eq!(a, b);
    }
}

//! Math types shared by the scene, flattener and backend.

pub use nalgebra::{Matrix3, Matrix4, Point3, UnitQuaternion, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Rotation type
pub type Quat = UnitQuaternion<f32>;

/// Builds a rotation from Euler angles in degrees.
///
/// Rotations are applied around Z first, then X, then Y, so a `(x, y, z)`
/// triple authored in a Y-up editor reads the same here.
pub fn euler_degrees(euler: &Vec3) -> Quat {
    let x = Quat::from_axis_angle(&Vec3::x_axis(), euler.x.to_radians());
    let y = Quat::from_axis_angle(&Vec3::y_axis(), euler.y.to_radians());
    let z = Quat::from_axis_angle(&Vec3::z_axis(), euler.z.to_radians());
    y * x * z
}

/// Composes translation, rotation and non-uniform scale into one matrix.
pub fn trs(position: &Vec3, rotation: &Quat, scale: &Vec3) -> Mat4 {
    Mat4::new_translation(position) * rotation.to_homogeneous() * Mat4::new_nonuniform_scaling(scale)
}

/// Local position, rotation and scale of a scene node.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Identity transform.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Transform with only a translation.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Returns a copy with the given rotation.
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Returns a copy with the given scale.
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn to_matrix(&self) -> Mat4 {
        trs(&self.position, &self.rotation, &self.scale)
    }

    /// Linear blend between two transforms; rotation uses slerp.
    pub fn lerp(&self, other: &Transform, t: f32) -> Transform {
        Transform {
            position: self.position.lerp(&other.position, t),
            rotation: self.rotation.slerp(&other.rotation, t),
            scale: self.scale.lerp(&other.scale, t),
        }
    }
}

/// Inverts an affine matrix, falling back to identity for singular input.
pub fn invert_or_identity(m: &Mat4) -> Mat4 {
    m.try_inverse().unwrap_or_else(Mat4::identity)
}

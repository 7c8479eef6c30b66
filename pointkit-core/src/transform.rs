//! 3D transformation utilities

use nalgebra::{Isometry3, Matrix3, Matrix4, Point3, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// A homogeneous 4x4 transformation that can be applied to points and point clouds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    pub matrix: Matrix4<f32>,
}

impl Transform3D {
    /// Create an identity transformation
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Create a translation transformation
    pub fn translation(translation: Vector3<f32>) -> Self {
        Self {
            matrix: Matrix4::new_translation(&translation),
        }
    }

    /// Create a rotation transformation from a quaternion
    pub fn rotation(rotation: UnitQuaternion<f32>) -> Self {
        Self {
            matrix: rotation.to_homogeneous(),
        }
    }

    /// Create a rigid transformation from translation and rotation
    pub fn from_translation_rotation(
        translation: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
    ) -> Self {
        Isometry3::from_parts(translation.into(), rotation).into()
    }

    /// Apply the transformation to a point
    pub fn transform_point(&self, point: &Point3<f32>) -> Point3<f32> {
        let homogeneous = self.matrix * point.to_homogeneous();
        Point3::from_homogeneous(homogeneous).unwrap_or(*point)
    }

    /// Apply the rotational part of the transformation to a vector
    pub fn transform_vector(&self, vector: &Vector3<f32>) -> Vector3<f32> {
        self.matrix.fixed_view::<3, 3>(0, 0) * vector
    }

    /// Upper-left 3x3 block
    pub fn rotation_matrix(&self) -> Matrix3<f32> {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// Last column without the homogeneous coordinate
    pub fn translation_vector(&self) -> Vector3<f32> {
        self.matrix.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// Yaw (about z), pitch (about y) and roll (about x) in radians, such that
    /// the rotation equals `Rz(yaw) * Ry(pitch) * Rx(roll)`.
    pub fn euler_angles_zyx(&self) -> Vector3<f32> {
        let rotation = Rotation3::from_matrix(&self.rotation_matrix());
        let (roll, pitch, yaw) = rotation.euler_angles();
        Vector3::new(yaw, pitch, roll)
    }

    /// Compose this transformation with another (`self` applied last)
    pub fn compose(self, other: Self) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Get the inverse transformation
    pub fn inverse(self) -> Option<Self> {
        self.matrix.try_inverse().map(|inv_matrix| Self {
            matrix: inv_matrix,
        })
    }

    /// Check if this is approximately the identity transformation
    pub fn is_identity(&self, epsilon: f32) -> bool {
        (self.matrix - Matrix4::identity()).norm() < epsilon
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for Transform3D {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        self.compose(rhs)
    }
}

impl From<Matrix4<f32>> for Transform3D {
    fn from(matrix: Matrix4<f32>) -> Self {
        Self { matrix }
    }
}

impl From<Isometry3<f32>> for Transform3D {
    fn from(isometry: Isometry3<f32>) -> Self {
        Self {
            matrix: isometry.to_homogeneous(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rotation_and_translation_blocks() {
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2);
        let t = Transform3D::from_translation_rotation(Vector3::new(1.0, 2.0, 3.0), rotation);

        assert_relative_eq!(t.translation_vector(), Vector3::new(1.0, 2.0, 3.0));
        let p = t.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(1.0, 3.0, 3.0), epsilon = 1e-6);
        assert_relative_eq!(t.rotation_matrix(), *rotation.to_rotation_matrix().matrix(), epsilon = 1e-6);
    }

    #[test]
    fn test_euler_angles_zyx() {
        let rotation = UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3);
        let angles = Transform3D::rotation(rotation).euler_angles_zyx();
        assert_relative_eq!(angles.x, 0.3, epsilon = 1e-5);
        assert_relative_eq!(angles.y, -0.2, epsilon = 1e-5);
        assert_relative_eq!(angles.z, 0.1, epsilon = 1e-5);
    }

    #[test]
    fn test_compose_and_inverse() {
        let a = Transform3D::translation(Vector3::new(1.0, 0.0, 0.0));
        let b = Transform3D::rotation(UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.7));
        let ab = a * b;
        let back = ab.inverse().unwrap() * ab;
        assert!(back.is_identity(1e-5));
    }
}

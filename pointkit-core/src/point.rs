//! Point types and related functionality

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// A point with RGBA color information
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColoredPoint3f {
    pub position: Point3f,
    pub color: [u8; 4],
}

/// A point with a surface normal and the curvature estimated alongside it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalPoint3f {
    pub position: Point3f,
    pub normal: Vector3f,
    pub curvature: f32,
}

/// Surface normal estimated for a single point.
///
/// `curvature` is the surface variation `λ0 / (λ0 + λ1 + λ2)` of the
/// neighbourhood covariance, in `[0, 1/3]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceNormal {
    pub normal: Vector3f,
    pub curvature: f32,
}

impl Default for ColoredPoint3f {
    fn default() -> Self {
        Self {
            position: Point3f::origin(),
            color: [255, 255, 255, 255],
        }
    }
}

impl Default for NormalPoint3f {
    fn default() -> Self {
        Self {
            position: Point3f::origin(),
            normal: Vector3f::new(0.0, 0.0, 1.0),
            curvature: 0.0,
        }
    }
}

impl Default for SurfaceNormal {
    fn default() -> Self {
        Self {
            normal: Vector3f::new(0.0, 0.0, 1.0),
            curvature: 0.0,
        }
    }
}

impl NormalPoint3f {
    /// Attach an estimated normal to a position
    pub fn from_parts(position: Point3f, normal: &SurfaceNormal) -> Self {
        Self {
            position,
            normal: normal.normal,
            curvature: normal.curvature,
        }
    }

    pub fn surface_normal(&self) -> SurfaceNormal {
        SurfaceNormal {
            normal: self.normal,
            curvature: self.curvature,
        }
    }
}

impl From<ColoredPoint3f> for Point3f {
    fn from(point: ColoredPoint3f) -> Self {
        point.position
    }
}

impl From<NormalPoint3f> for Point3f {
    fn from(point: NormalPoint3f) -> Self {
        point.position
    }
}

//! Point cloud data structures and functionality

use crate::point::*;
use crate::traits::HasPosition;
use crate::transform::Transform3D;
use nalgebra::{Isometry3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// A generic point cloud container.
///
/// Besides the points themselves the cloud records the pose of the sensor
/// that acquired it (the PCD `VIEWPOINT`), which range images and normal
/// orientation use as their origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloud<T> {
    pub points: Vec<T>,
    pub sensor_origin: Point3f,
    pub sensor_orientation: UnitQuaternion<f32>,
}

/// A point cloud with 3D points
pub type PointCloud3f = PointCloud<Point3f>;

/// A point cloud with colored points
pub type ColoredPointCloud3f = PointCloud<ColoredPoint3f>;

/// A point cloud with normal vectors
pub type NormalPointCloud3f = PointCloud<NormalPoint3f>;

impl<T> PointCloud<T> {
    /// Create a new empty point cloud
    pub fn new() -> Self {
        Self::from_points(Vec::new())
    }

    /// Create a new point cloud with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_points(Vec::with_capacity(capacity))
    }

    /// Create a point cloud from a vector of points, with the sensor at the origin
    pub fn from_points(points: Vec<T>) -> Self {
        Self {
            points,
            sensor_origin: Point3f::origin(),
            sensor_orientation: UnitQuaternion::identity(),
        }
    }

    /// Replace the sensor pose, keeping the points
    pub fn with_sensor_pose(mut self, origin: Point3f, orientation: UnitQuaternion<f32>) -> Self {
        self.sensor_origin = origin;
        self.sensor_orientation = orientation;
        self
    }

    /// Sensor pose as a rigid transform from sensor to cloud coordinates
    pub fn sensor_pose(&self) -> Isometry3<f32> {
        Isometry3::from_parts(
            Translation3::from(self.sensor_origin.coords),
            self.sensor_orientation,
        )
    }

    /// Build a cloud of a different point type that keeps this cloud's sensor pose
    pub fn map_points<U, F>(&self, f: F) -> PointCloud<U>
    where
        F: FnMut(&T) -> U,
    {
        PointCloud {
            points: self.points.iter().map(f).collect(),
            sensor_origin: self.sensor_origin,
            sensor_orientation: self.sensor_orientation,
        }
    }

    /// Get the number of points in the cloud
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Add a point to the cloud
    pub fn push(&mut self, point: T) {
        self.points.push(point);
    }

    /// Get an iterator over the points
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.points.iter()
    }

    /// Get a mutable iterator over the points
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.points.iter_mut()
    }

    /// Clear all points from the cloud
    pub fn clear(&mut self) {
        self.points.clear();
    }
}

impl<T: Clone> PointCloud<T> {
    /// Copy the points at `indices` (in the given order) into a new cloud.
    ///
    /// Out-of-range indices are skipped.
    pub fn extract(&self, indices: &[usize]) -> Self {
        PointCloud {
            points: indices
                .iter()
                .filter_map(|&i| self.points.get(i).cloned())
                .collect(),
            sensor_origin: self.sensor_origin,
            sensor_orientation: self.sensor_orientation,
        }
    }
}

impl<T: HasPosition> PointCloud<T> {
    /// Positions of all points, in order
    pub fn positions(&self) -> Vec<Point3f> {
        self.points.iter().map(HasPosition::position).collect()
    }

    /// Axis-aligned bounds `(min, max)`, or `None` for an empty cloud
    pub fn bounding_box(&self) -> Option<(Point3f, Point3f)> {
        let mut iter = self.points.iter().map(HasPosition::position);
        let first = iter.next()?;
        Some(iter.fold((first, first), |(min, max), p| {
            (min.inf(&p), max.sup(&p))
        }))
    }

    /// Mean position, or `None` for an empty cloud
    pub fn centroid(&self) -> Option<Point3f> {
        if self.points.is_empty() {
            return None;
        }
        let sum = self
            .points
            .iter()
            .fold(Vector3f::zeros(), |acc, p| acc + p.position().coords);
        Some(Point3f::from(sum / self.points.len() as f32))
    }
}

impl<T> Default for PointCloud<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for PointCloud<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl<T> IndexMut<usize> for PointCloud<T> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.points[index]
    }
}

impl<T> IntoIterator for PointCloud<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a PointCloud<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

impl<T> Extend<T> for PointCloud<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.points.extend(iter);
    }
}

impl<T> FromIterator<T> for PointCloud<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_points(Vec::from_iter(iter))
    }
}

impl PointCloud<Point3f> {
    /// Apply a transformation to all points in the cloud
    pub fn transform(&mut self, transform: &Transform3D) {
        for point in &mut self.points {
            *point = transform.transform_point(point);
        }
    }

    /// Transformed copy of the cloud; the sensor pose is left unchanged
    pub fn transformed(&self, transform: &Transform3D) -> Self {
        self.map_points(|p| transform.transform_point(p))
    }
}

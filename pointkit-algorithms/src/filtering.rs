//! Filtering algorithms

use pointkit_core::{Error, HasPosition, Point3f, PointCloud, Result, Vector3f};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coordinate axis used by the pass-through filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn component(self, point: &Point3f) -> f32 {
        match self {
            Axis::X => point.x,
            Axis::Y => point.y,
            Axis::Z => point.z,
        }
    }
}

impl std::str::FromStr for Axis {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            other => Err(Error::InvalidData(format!("unknown axis '{}'", other))),
        }
    }
}

/// Pass-through filtering
///
/// Keeps the points whose coordinate along `axis` lies in `[min, max]`
/// (limits inclusive). With `negative` set the selection is inverted and the
/// points outside the interval are kept instead. Point order and the sensor
/// pose are preserved; points with a non-finite coordinate are always removed.
///
/// # Arguments
/// * `cloud` - Input point cloud
/// * `axis` - Axis the limits apply to
/// * `min` - Lower limit
/// * `max` - Upper limit
/// * `negative` - Keep the points outside the limits instead
///
/// # Example
/// ```rust
/// use pointkit_core::{PointCloud, Point3f};
/// use pointkit_algorithms::{pass_through_filter, Axis};
///
/// fn main() -> pointkit_core::Result<()> {
///     let cloud = PointCloud::from_points(vec![
///         Point3f::new(0.0, 0.0, 0.5),
///         Point3f::new(0.0, 0.0, 1.5),
///         Point3f::new(0.0, 0.0, -0.2),
///     ]);
///
///     let filtered = pass_through_filter(&cloud, Axis::Z, 0.0, 1.0, false)?;
///     assert_eq!(filtered.len(), 1);
///     Ok(())
/// }
/// ```
pub fn pass_through_filter<T>(
    cloud: &PointCloud<T>,
    axis: Axis,
    min: f32,
    max: f32,
    negative: bool,
) -> Result<PointCloud<T>>
where
    T: HasPosition + Clone,
{
    if min.is_nan() || max.is_nan() || min > max {
        return Err(Error::InvalidData(format!(
            "invalid pass-through limits [{}, {}]",
            min, max
        )));
    }

    let kept: Vec<usize> = cloud
        .iter()
        .enumerate()
        .filter(|(_, point)| {
            let position = point.position();
            if !position.coords.iter().all(|c| c.is_finite()) {
                return false;
            }
            let value = axis.component(&position);
            let inside = value >= min && value <= max;
            inside != negative
        })
        .map(|(i, _)| i)
        .collect();

    log::debug!(
        "pass-through on {:?} in [{}, {}]: kept {} of {} points",
        axis,
        min,
        max,
        kept.len(),
        cloud.len()
    );
    Ok(cloud.extract(&kept))
}

/// Voxel grid filtering
///
/// Replaces all points falling into the same cubic voxel of edge `leaf_size`
/// by their centroid. The grid is anchored at the minimum corner of the
/// cloud's bounding box, and the output is ordered by voxel (z, then y, then
/// x), so the result does not depend on the input order beyond floating point
/// summation. Non-finite points are dropped.
///
/// # Arguments
/// * `cloud` - Input point cloud
/// * `leaf_size` - Edge length of each voxel
///
/// # Example
/// ```rust
/// use pointkit_core::{PointCloud, Point3f};
/// use pointkit_algorithms::voxel_grid_filter;
///
/// fn main() -> pointkit_core::Result<()> {
///     let cloud = PointCloud::from_points(vec![
///         Point3f::new(0.0, 0.0, 0.0),
///         Point3f::new(0.1, 0.0, 0.0),
///         Point3f::new(0.0, 0.1, 0.0),
///         Point3f::new(1.0, 1.0, 1.0),
///     ]);
///
///     let filtered = voxel_grid_filter(&cloud, 0.5)?;
///     assert_eq!(filtered.len(), 2);
///     Ok(())
/// }
/// ```
pub fn voxel_grid_filter(cloud: &PointCloud<Point3f>, leaf_size: f32) -> Result<PointCloud<Point3f>> {
    if !(leaf_size.is_finite() && leaf_size > 0.0) {
        return Err(Error::InvalidData(format!(
            "leaf size must be positive, got {}",
            leaf_size
        )));
    }
    let is_finite = |p: &&Point3f| p.coords.iter().all(|c| c.is_finite());
    let Some(min) = cloud.iter().filter(is_finite).copied().reduce(|a, b| a.inf(&b)) else {
        return Ok(PointCloud::from_points(Vec::new())
            .with_sensor_pose(cloud.sensor_origin, cloud.sensor_orientation));
    };

    let inverse_leaf = 1.0 / leaf_size;
    let mut voxels: BTreeMap<(i64, i64, i64), (Vector3f, usize)> = BTreeMap::new();
    for point in cloud.iter().filter(is_finite) {
        let offset = (point - min) * inverse_leaf;
        let key = (
            offset.z.floor() as i64,
            offset.y.floor() as i64,
            offset.x.floor() as i64,
        );
        let entry = voxels.entry(key).or_insert((Vector3f::zeros(), 0));
        entry.0 += point.coords;
        entry.1 += 1;
    }

    let filtered = PointCloud {
        points: voxels
            .into_values()
            .map(|(sum, count)| Point3f::from(sum / count as f32))
            .collect(),
        sensor_origin: cloud.sensor_origin,
        sensor_orientation: cloud.sensor_orientation,
    };
    log::debug!(
        "voxel grid {}: {} -> {} points",
        leaf_size,
        cloud.len(),
        filtered.len()
    );
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pointkit_core::NormalPoint3f;

    fn line_along_z() -> PointCloud<Point3f> {
        (0..5).map(|i| Point3f::new(0.0, 0.0, i as f32 * 0.5)).collect()
    }

    #[test]
    fn test_pass_through_limits_are_inclusive() {
        let cloud = line_along_z();
        let filtered = pass_through_filter(&cloud, Axis::Z, 0.0, 1.0, false).unwrap();
        let zs: Vec<f32> = filtered.iter().map(|p| p.z).collect();
        assert_eq!(zs, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_pass_through_negative_keeps_outside() {
        let cloud = line_along_z();
        let filtered = pass_through_filter(&cloud, Axis::Z, 0.0, 1.0, true).unwrap();
        let zs: Vec<f32> = filtered.iter().map(|p| p.z).collect();
        assert_eq!(zs, vec![1.5, 2.0]);
    }

    #[test]
    fn test_pass_through_drops_nan_and_keeps_pose() {
        let mut cloud = line_along_z().with_sensor_pose(
            Point3f::new(1.0, 2.0, 3.0),
            nalgebra::UnitQuaternion::identity(),
        );
        cloud.push(Point3f::new(f32::NAN, 0.0, 0.5));
        let filtered = pass_through_filter(&cloud, Axis::Z, -10.0, 10.0, false).unwrap();
        assert_eq!(filtered.len(), 5);
        assert_eq!(filtered.sensor_origin, Point3f::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_pass_through_generic_point_type() {
        let cloud = PointCloud::from_points(vec![
            NormalPoint3f {
                position: Point3f::new(0.2, 0.0, 0.0),
                ..Default::default()
            },
            NormalPoint3f {
                position: Point3f::new(-0.2, 0.0, 0.0),
                ..Default::default()
            },
        ]);
        let filtered = pass_through_filter(&cloud, Axis::X, 0.0, 1.0, false).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_relative_eq!(filtered[0].position.x, 0.2);
    }

    #[test]
    fn test_pass_through_rejects_inverted_limits() {
        assert!(pass_through_filter(&line_along_z(), Axis::Y, 1.0, 0.0, false).is_err());
    }

    #[test]
    fn test_voxel_grid_centroids() {
        let cloud = PointCloud::from_points(vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(0.2, 0.0, 0.0),
            Point3f::new(0.0, 0.4, 0.0),
            Point3f::new(2.0, 0.0, 0.0),
        ]);
        let filtered = voxel_grid_filter(&cloud, 1.0).unwrap();
        assert_eq!(filtered.len(), 2);
        assert_relative_eq!(filtered[0], Point3f::new(0.2 / 3.0, 0.4 / 3.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(filtered[1], Point3f::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_voxel_grid_order_is_input_independent() {
        let points: Vec<Point3f> = (0..50)
            .map(|i| Point3f::new((i % 7) as f32 * 0.3, (i % 5) as f32 * 0.3, (i % 3) as f32 * 0.3))
            .collect();
        let mut reversed = points.clone();
        reversed.reverse();

        let a = voxel_grid_filter(&PointCloud::from_points(points), 0.25).unwrap();
        let b = voxel_grid_filter(&PointCloud::from_points(reversed), 0.25).unwrap();
        assert_eq!(a.len(), b.len());
        for (p, q) in a.iter().zip(b.iter()) {
            assert_relative_eq!(p, q, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_voxel_grid_invalid_leaf() {
        assert!(voxel_grid_filter(&line_along_z(), 0.0).is_err());
        assert!(voxel_grid_filter(&PointCloud::new(), 0.1).unwrap().is_empty());
    }
}

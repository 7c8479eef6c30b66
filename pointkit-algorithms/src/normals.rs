//! Normal estimation algorithms
//!
//! Normals are the eigenvector of the smallest eigenvalue of the covariance
//! of each point's neighbourhood. The neighbourhood always contains the query
//! point itself, which is why a point needs at least one *other* point in
//! range to get a normal at all.

use crate::nearest_neighbor::SpatialIndex;
use nalgebra::{Matrix3, SymmetricEigen};
use pointkit_core::{
    Error, NormalPoint3f, Point3f, PointCloud, Result, SurfaceNormal, Vector3f,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration for normal estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalEstimationConfig {
    /// Neighbourhood size (query point included) when no radius is set
    pub k_neighbors: usize,
    /// Use every point within this radius instead of a fixed k
    pub radius: Option<f32>,
    /// Flip normals so that they face the viewpoint
    pub consistent_orientation: bool,
    /// Viewpoint for orientation; defaults to the cloud's sensor origin
    pub viewpoint: Option<Point3f>,
}

impl Default for NormalEstimationConfig {
    fn default() -> Self {
        Self {
            k_neighbors: 10,
            radius: None,
            consistent_orientation: true,
            viewpoint: None,
        }
    }
}

/// Estimate normals for a point cloud using its k nearest neighbors
pub fn estimate_normals(cloud: &PointCloud<Point3f>, k: usize) -> Result<Vec<SurfaceNormal>> {
    let config = NormalEstimationConfig {
        k_neighbors: k,
        ..Default::default()
    };
    estimate_normals_with_config(cloud, &config)
}

/// Estimate normals using every neighbor within `radius`
pub fn estimate_normals_radius(
    cloud: &PointCloud<Point3f>,
    radius: f32,
    consistent_orientation: bool,
) -> Result<Vec<SurfaceNormal>> {
    let config = NormalEstimationConfig {
        radius: Some(radius),
        consistent_orientation,
        ..Default::default()
    };
    estimate_normals_with_config(cloud, &config)
}

/// Estimate normals with full control over the neighbourhood and orientation
pub fn estimate_normals_with_config(
    cloud: &PointCloud<Point3f>,
    config: &NormalEstimationConfig,
) -> Result<Vec<SurfaceNormal>> {
    let index = SpatialIndex::new(&cloud.points);
    estimate_normals_with_index(cloud, &index, config)
}

/// Estimate normals reusing a spatial index already built over `cloud`
pub fn estimate_normals_with_index(
    cloud: &PointCloud<Point3f>,
    index: &SpatialIndex,
    config: &NormalEstimationConfig,
) -> Result<Vec<SurfaceNormal>> {
    if cloud.is_empty() {
        return Err(Error::EmptyCloud);
    }
    if index.len() != cloud.len() {
        return Err(Error::InvalidData(format!(
            "spatial index holds {} points but the cloud has {}",
            index.len(),
            cloud.len()
        )));
    }
    match config.radius {
        Some(r) if !(r.is_finite() && r > 0.0) => {
            return Err(Error::InvalidData(format!("normal radius must be positive, got {}", r)));
        }
        None if config.k_neighbors < 3 => {
            return Err(Error::InvalidData(format!(
                "k_neighbors must be at least 3, got {}",
                config.k_neighbors
            )));
        }
        _ => {}
    }

    let viewpoint = config.viewpoint.unwrap_or(cloud.sensor_origin);

    cloud
        .points
        .par_iter()
        .enumerate()
        .map(|(i, point)| {
            let neighbors: Vec<usize> = match config.radius {
                Some(r) => index.radius_squared(point, r).into_iter().map(|(j, _)| j).collect(),
                None => index
                    .k_nearest_squared(point, config.k_neighbors)
                    .into_iter()
                    .map(|(j, _)| j)
                    .collect(),
            };
            if neighbors.len() < 2 {
                return Err(Error::InsufficientNeighbors {
                    index: i,
                    radius: config.radius.unwrap_or(0.0),
                });
            }

            let neighborhood: Vec<Point3f> = neighbors.iter().map(|&j| cloud.points[j]).collect();
            let mut normal = fit_plane_normal(&neighborhood);
            if config.consistent_orientation {
                normal = orient_towards(normal, point, &viewpoint);
            }
            Ok(normal)
        })
        .collect()
}

/// Plane normal and surface variation of a set of points.
///
/// The normal is unit length; for fewer than two points the default
/// `+z` normal with zero curvature is returned.
pub fn fit_plane_normal(points: &[Point3f]) -> SurfaceNormal {
    if points.len() < 2 {
        return SurfaceNormal::default();
    }
    let n = points.len() as f32;
    let centroid = points.iter().fold(Vector3f::zeros(), |acc, p| acc + p.coords) / n;

    let mut covariance = Matrix3::zeros();
    for p in points {
        let d = p.coords - centroid;
        covariance += d * d.transpose();
    }
    covariance /= n;

    let eigen = SymmetricEigen::new(covariance);
    let mut min_idx = 0;
    for i in 1..3 {
        if eigen.eigenvalues[i] < eigen.eigenvalues[min_idx] {
            min_idx = i;
        }
    }

    let normal = eigen.eigenvectors.column(min_idx).into_owned();
    let normal = normal.try_normalize(1e-12).unwrap_or_else(|| Vector3f::new(0.0, 0.0, 1.0));

    let total: f32 = eigen.eigenvalues.iter().map(|v| v.max(0.0)).sum();
    let curvature = if total > 0.0 {
        eigen.eigenvalues[min_idx].max(0.0) / total
    } else {
        0.0
    };

    SurfaceNormal { normal, curvature }
}

/// Flip `normal` if it points away from `viewpoint`
pub fn orient_towards(normal: SurfaceNormal, point: &Point3f, viewpoint: &Point3f) -> SurfaceNormal {
    if normal.normal.dot(&(viewpoint - point)) < 0.0 {
        SurfaceNormal {
            normal: -normal.normal,
            curvature: normal.curvature,
        }
    } else {
        normal
    }
}

/// Pair every point with its estimated normal
pub fn normals_to_cloud(
    cloud: &PointCloud<Point3f>,
    normals: &[SurfaceNormal],
) -> Result<PointCloud<NormalPoint3f>> {
    if cloud.len() != normals.len() {
        return Err(Error::InvalidData(format!(
            "{} normals for {} points",
            normals.len(),
            cloud.len()
        )));
    }
    let mut normals_iter = normals.iter();
    Ok(cloud.map_points(|p| {
        // lengths checked above
        let normal = normals_iter.next().copied().unwrap_or_default();
        NormalPoint3f::from_parts(*p, &normal)
    }))
}

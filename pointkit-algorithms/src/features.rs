//! Fast Point Feature Histograms
//!
//! Each point gets a 33-bin signature made of three 11-bin sub-histograms
//! over the Darboux-frame angles between the point and its neighbours.

use crate::nearest_neighbor::SpatialIndex;
use pointkit_core::{Error, Point3f, PointCloud, Result, SurfaceNormal, Vector3f};
use rayon::prelude::*;
use std::f32::consts::PI;

/// Bins per angular feature
pub const FPFH_BINS_PER_FEATURE: usize = 11;

/// Total number of bins in a signature
pub const FPFH_SIGNATURE_SIZE: usize = 3 * FPFH_BINS_PER_FEATURE;

/// A 33-bin FPFH descriptor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpfhSignature(pub [f32; FPFH_SIGNATURE_SIZE]);

impl FpfhSignature {
    pub fn zeros() -> Self {
        Self([0.0; FPFH_SIGNATURE_SIZE])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Squared Euclidean distance in descriptor space
    pub fn distance_squared(&self, other: &Self) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }

    /// One of the three sub-histograms (0 = alpha, 1 = phi, 2 = theta)
    pub fn sub_histogram(&self, feature: usize) -> &[f32] {
        let start = feature * FPFH_BINS_PER_FEATURE;
        &self.0[start..start + FPFH_BINS_PER_FEATURE]
    }
}

impl Default for FpfhSignature {
    fn default() -> Self {
        Self::zeros()
    }
}

/// Angular features of a point pair: `(alpha, phi, theta, distance)`.
///
/// Returns `None` when the points coincide or the connecting line is parallel
/// to the source normal, in which case the Darboux frame is undefined.
pub fn compute_pair_features(
    p1: &Point3f,
    n1: &Vector3f,
    p2: &Point3f,
    n2: &Vector3f,
) -> Option<(f32, f32, f32, f32)> {
    let mut dp = p2 - p1;
    let distance = dp.norm();
    if distance == 0.0 {
        return None;
    }

    let angle1 = n1.dot(&dp) / distance;
    let angle2 = n2.dot(&dp) / distance;

    // the frame is anchored at the point whose normal is closer to the line
    let (u, other, theta) = if angle1.abs().acos() > angle2.abs().acos() {
        dp = -dp;
        (n2, n1, -angle2)
    } else {
        (n1, n2, angle1)
    };

    let v = dp.cross(u);
    let v_norm = v.norm();
    if v_norm == 0.0 {
        return None;
    }
    let v = v / v_norm;
    let w = u.cross(&v);

    let phi = v.dot(other);
    let alpha = w.dot(other).atan2(u.dot(other));

    Some((alpha, phi, theta, distance))
}

fn bin_index(value: f32) -> usize {
    let bins = FPFH_BINS_PER_FEATURE as f32;
    let idx = (bins * value).floor();
    idx.clamp(0.0, bins - 1.0) as usize
}

/// Simplified point feature histogram of one point against its neighbours.
///
/// `neighbors` must include the point itself; each valid pair adds
/// `100 / (neighbors.len() - 1)` to one bin of every sub-histogram.
fn compute_spfh(
    points: &[Point3f],
    normals: &[SurfaceNormal],
    idx: usize,
    neighbors: &[(usize, f32)],
) -> FpfhSignature {
    let mut hist = FpfhSignature::zeros();
    if neighbors.len() < 2 {
        return hist;
    }
    let increment = 100.0 / (neighbors.len() - 1) as f32;
    let p = &points[idx];
    let n = &normals[idx].normal;

    for &(j, _) in neighbors {
        if j == idx {
            continue;
        }
        let Some((alpha, phi, theta, _)) =
            compute_pair_features(p, n, &points[j], &normals[j].normal)
        else {
            continue;
        };

        hist.0[bin_index((alpha + PI) / (2.0 * PI))] += increment;
        hist.0[FPFH_BINS_PER_FEATURE + bin_index((phi + 1.0) * 0.5)] += increment;
        hist.0[2 * FPFH_BINS_PER_FEATURE + bin_index((theta + 1.0) * 0.5)] += increment;
    }
    hist
}

/// Compute FPFH descriptors for every point of `cloud`
pub fn compute_fpfh_features(
    cloud: &PointCloud<Point3f>,
    normals: &[SurfaceNormal],
    radius: f32,
) -> Result<Vec<FpfhSignature>> {
    let index = SpatialIndex::new(&cloud.points);
    compute_fpfh_features_with_index(cloud, normals, &index, radius)
}

/// Compute FPFH descriptors reusing a spatial index built over `cloud`.
///
/// The descriptor of a point is its own SPFH plus the neighbours' SPFHs
/// weighted by inverse squared distance, the weighted part rescaled so that
/// each sub-histogram sums to 100.
pub fn compute_fpfh_features_with_index(
    cloud: &PointCloud<Point3f>,
    normals: &[SurfaceNormal],
    index: &SpatialIndex,
    radius: f32,
) -> Result<Vec<FpfhSignature>> {
    if cloud.is_empty() {
        return Err(Error::EmptyCloud);
    }
    if normals.len() != cloud.len() {
        return Err(Error::InvalidData(format!(
            "{} normals for {} points",
            normals.len(),
            cloud.len()
        )));
    }
    if index.len() != cloud.len() {
        return Err(Error::InvalidData(format!(
            "spatial index holds {} points but the cloud has {}",
            index.len(),
            cloud.len()
        )));
    }
    if !(radius.is_finite() && radius > 0.0) {
        return Err(Error::InvalidData(format!("feature radius must be positive, got {}", radius)));
    }

    let points = &cloud.points;
    let neighborhoods: Vec<Vec<(usize, f32)>> = points
        .par_iter()
        .map(|p| index.radius_squared(p, radius))
        .collect();

    if let Some(isolated) = neighborhoods.iter().position(|n| n.len() < 2) {
        return Err(Error::InsufficientNeighbors { index: isolated, radius });
    }

    let spfh: Vec<FpfhSignature> = neighborhoods
        .par_iter()
        .enumerate()
        .map(|(i, neighbors)| compute_spfh(points, normals, i, neighbors))
        .collect();

    let features = neighborhoods
        .par_iter()
        .enumerate()
        .map(|(i, neighbors)| {
            let mut weighted = FpfhSignature::zeros();
            for &(j, dist_sq) in neighbors {
                if dist_sq == 0.0 {
                    continue;
                }
                let weight = 1.0 / dist_sq;
                for (acc, value) in weighted.0.iter_mut().zip(spfh[j].0.iter()) {
                    *acc += value * weight;
                }
            }

            let mut signature = spfh[i];
            for feature in 0..3 {
                let range = feature * FPFH_BINS_PER_FEATURE..(feature + 1) * FPFH_BINS_PER_FEATURE;
                let sum: f32 = weighted.0[range.clone()].iter().sum();
                if sum > 0.0 {
                    let scale = 100.0 / sum;
                    for b in range {
                        signature.0[b] += weighted.0[b] * scale;
                    }
                }
            }
            signature
        })
        .collect();

    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid(n: usize, spacing: f32) -> PointCloud<Point3f> {
        (0..n * n)
            .map(|k| Point3f::new((k / n) as f32 * spacing, (k % n) as f32 * spacing, 0.0))
            .collect()
    }

    #[test]
    fn test_pair_features_coplanar_normals() {
        let up = Vector3f::z();
        let (alpha, phi, theta, d) =
            compute_pair_features(&Point3f::origin(), &up, &Point3f::new(1.0, 0.0, 0.0), &up)
                .unwrap();
        assert_relative_eq!(alpha, 0.0, epsilon = 1e-6);
        assert_relative_eq!(phi, 0.0, epsilon = 1e-6);
        assert_relative_eq!(theta, 0.0, epsilon = 1e-6);
        assert_relative_eq!(d, 1.0);
    }

    #[test]
    fn test_pair_features_degenerate() {
        let up = Vector3f::z();
        let p = Point3f::new(0.3, 0.2, 0.1);
        assert!(compute_pair_features(&p, &up, &p, &up).is_none());
        // line parallel to both normals
        assert!(compute_pair_features(&p, &up, &(p + up), &up).is_none());
    }

    #[test]
    fn test_plane_signature_is_concentrated() {
        let cloud = grid(8, 0.01);
        let normals = vec![SurfaceNormal::default(); cloud.len()];
        let features = compute_fpfh_features(&cloud, &normals, 0.025).unwrap();

        assert_eq!(features.len(), cloud.len());
        for f in &features {
            for feature in 0..3 {
                let sub = f.sub_histogram(feature);
                assert_relative_eq!(sub[5], 200.0, epsilon = 1e-2);
                assert_relative_eq!(sub.iter().sum::<f32>(), 200.0, epsilon = 1e-2);
            }
        }
    }

    #[test]
    fn test_sphere_spreads_theta_histogram() {
        let golden = PI * (3.0 - 5.0_f32.sqrt());
        let count = 400;
        let cloud: PointCloud<Point3f> = (0..count)
            .map(|i| {
                let y = 1.0 - 2.0 * (i as f32 + 0.5) / count as f32;
                let r = (1.0 - y * y).sqrt();
                let t = golden * i as f32;
                Point3f::new(r * t.cos(), y, r * t.sin())
            })
            .collect();
        let normals: Vec<SurfaceNormal> = cloud
            .iter()
            .map(|p| SurfaceNormal {
                normal: p.coords.normalize(),
                curvature: 0.0,
            })
            .collect();
        let features = compute_fpfh_features(&cloud, &normals, 0.4).unwrap();

        // neighbours below the tangent plane push theta under the central bin
        let theta = features[count / 2].sub_histogram(2);
        assert!(theta[..5].iter().sum::<f32>() > 1.0);
        assert!(theta[5] < 199.0);
    }

    #[test]
    fn test_isolated_point_is_an_error() {
        let mut cloud = grid(3, 0.01);
        cloud.push(Point3f::new(1.0, 1.0, 1.0));
        let normals = vec![SurfaceNormal::default(); cloud.len()];
        match compute_fpfh_features(&cloud, &normals, 0.02) {
            Err(Error::InsufficientNeighbors { index, .. }) => assert_eq!(index, 9),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_normal_count_mismatch_is_an_error() {
        let cloud = grid(3, 0.01);
        let normals = vec![SurfaceNormal::default(); 2];
        assert!(matches!(
            compute_fpfh_features(&cloud, &normals, 0.02),
            Err(Error::InvalidData(_))
        ));
    }
}

//! Moving Least Squares (MLS) surface smoothing
//!
//! Every point is projected onto a polynomial height field that is fitted to
//! its neighbourhood in the frame of the neighbourhood's least-squares plane.
//! The fit is weighted with a Gaussian of the distance to the query point, and
//! the normal of the output point comes from the gradient of the polynomial.

use nalgebra::{DMatrix, DVector};
use pointkit_algorithms::{fit_plane_normal, orient_towards, SpatialIndex};
use pointkit_core::{Error, NormalPoint3f, Point3f, PointCloud, Result, Vector3f};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration for MLS smoothing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlsConfig {
    /// Radius of the neighbourhood used for each fit
    pub search_radius: f32,
    /// Order of the fitted polynomial; 0 projects onto the local plane
    pub polynomial_order: usize,
    /// Squared Gaussian width of the distance weights
    pub sqr_gauss_param: f32,
    /// Store the surface normal of every output point
    pub compute_normals: bool,
}

impl Default for MlsConfig {
    fn default() -> Self {
        Self::with_search_radius(0.03)
    }
}

impl MlsConfig {
    /// Configuration with the Gaussian width tied to `radius`
    pub fn with_search_radius(radius: f32) -> Self {
        Self {
            search_radius: radius,
            polynomial_order: 2,
            sqr_gauss_param: radius * radius,
            compute_normals: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.search_radius.is_finite() && self.search_radius > 0.0) {
            return Err(Error::InvalidData(format!(
                "MLS search radius must be positive, got {}",
                self.search_radius
            )));
        }
        if !(self.sqr_gauss_param.is_finite() && self.sqr_gauss_param > 0.0) {
            return Err(Error::InvalidData(format!(
                "MLS Gaussian parameter must be positive, got {}",
                self.sqr_gauss_param
            )));
        }
        if self.polynomial_order > MLS_MAX_POLYNOMIAL_ORDER {
            return Err(Error::Unsupported(format!(
                "MLS polynomial order {} (at most {})",
                self.polynomial_order, MLS_MAX_POLYNOMIAL_ORDER
            )));
        }
        Ok(())
    }

    /// Number of coefficients of a bivariate polynomial of the configured order
    pub fn coefficient_count(&self) -> usize {
        (self.polynomial_order + 1) * (self.polynomial_order + 2) / 2
    }
}

/// Highest polynomial order accepted by [`MlsConfig::validate`]
pub const MLS_MAX_POLYNOMIAL_ORDER: usize = 5;

/// Minimum neighbourhood size (query point included) for a point to be kept
pub const MLS_MIN_NEIGHBORS: usize = 3;

/// Monomials `u^i v^j` with `i + j <= order`, ordered by `i` then `j`
fn polynomial_terms(u: f64, v: f64, order: usize) -> Vec<f64> {
    let mut terms = Vec::with_capacity((order + 1) * (order + 2) / 2);
    let mut u_pow = 1.0;
    for ui in 0..=order {
        let mut v_pow = 1.0;
        for _ in 0..=(order - ui) {
            terms.push(u_pow * v_pow);
            v_pow *= v;
        }
        u_pow *= u;
    }
    terms
}

/// Weighted least squares fit of `w = f(u, v)`; samples are `(u, v, w, weight)`
fn fit_height_field(samples: &[[f64; 4]], order: usize) -> Option<DVector<f64>> {
    let n_coeff = (order + 1) * (order + 2) / 2;
    let mut ata = DMatrix::<f64>::zeros(n_coeff, n_coeff);
    let mut atb = DVector::<f64>::zeros(n_coeff);

    for &[u, v, w, weight] in samples {
        let terms = polynomial_terms(u, v, order);
        for r in 0..n_coeff {
            atb[r] += weight * terms[r] * w;
            for c in 0..n_coeff {
                ata[(r, c)] += weight * terms[r] * terms[c];
            }
        }
    }

    match ata.clone().cholesky() {
        Some(chol) => Some(chol.solve(&atb)),
        None => ata.svd(true, true).solve(&atb, 1e-12).ok(),
    }
}

/// Any unit vector perpendicular to `n`
fn perpendicular(n: &Vector3f) -> Vector3f {
    let axis = if n.x.abs() < 0.9 {
        Vector3f::x()
    } else {
        Vector3f::y()
    };
    n.cross(&axis).normalize()
}

/// Smooth `cloud` with moving least squares.
///
/// Points with fewer than [`MLS_MIN_NEIGHBORS`] points within
/// `search_radius` are dropped; the order of the remaining points is kept.
/// When there are fewer neighbours than polynomial coefficients the point is
/// projected onto the local plane. Normals face the cloud's sensor origin;
/// with `compute_normals` off they are left as zero vectors.
pub fn mls_smooth(cloud: &PointCloud<Point3f>, config: &MlsConfig) -> Result<PointCloud<NormalPoint3f>> {
    if cloud.is_empty() {
        return Err(Error::EmptyCloud);
    }
    config.validate()?;

    let index = SpatialIndex::new(&cloud.points);
    let viewpoint = cloud.sensor_origin;

    let smoothed: Vec<NormalPoint3f> = cloud
        .points
        .par_iter()
        .filter_map(|point| {
            let neighbors = index.radius_squared(point, config.search_radius);
            if neighbors.len() < MLS_MIN_NEIGHBORS {
                return None;
            }
            let neighborhood: Vec<Point3f> = neighbors.iter().map(|&(j, _)| cloud.points[j]).collect();
            Some(project_point(point, &neighborhood, &viewpoint, config))
        })
        .collect();

    log::debug!(
        "MLS kept {} of {} points (radius {})",
        smoothed.len(),
        cloud.len(),
        config.search_radius
    );

    Ok(PointCloud::from_points(smoothed).with_sensor_pose(cloud.sensor_origin, cloud.sensor_orientation))
}

fn project_point(
    point: &Point3f,
    neighborhood: &[Point3f],
    viewpoint: &Point3f,
    config: &MlsConfig,
) -> NormalPoint3f {
    let n_points = neighborhood.len() as f32;
    let mean = neighborhood.iter().fold(Vector3f::zeros(), |acc, p| acc + p.coords) / n_points;
    let plane = orient_towards(fit_plane_normal(neighborhood), point, viewpoint);
    let n = plane.normal;

    // Origin of the local frame: the query point dropped onto the plane
    let origin = point - n * (point.coords - mean).dot(&n);

    let order = config.polynomial_order;
    let (position, normal) = if order > 0 && neighborhood.len() >= config.coefficient_count() {
        let u_axis = perpendicular(&n);
        let v_axis = n.cross(&u_axis);
        let gauss = config.sqr_gauss_param as f64;

        let samples: Vec<[f64; 4]> = neighborhood
            .iter()
            .map(|q| {
                let d = q - origin;
                let weight = (-((q - point).norm_squared() as f64) / gauss).exp();
                [d.dot(&u_axis) as f64, d.dot(&v_axis) as f64, d.dot(&n) as f64, weight]
            })
            .collect();

        match fit_height_field(&samples, order) {
            Some(c) => {
                let position = origin + n * c[0] as f32;
                // df/dv is c[1], df/du is c[order + 1]
                let gradient = u_axis * c[order + 1] as f32 + v_axis * c[1] as f32;
                let normal = (n - gradient).try_normalize(1e-12).unwrap_or(n);
                (position, normal)
            }
            None => (origin, n),
        }
    } else {
        (origin, n)
    };

    if config.compute_normals {
        NormalPoint3f {
            position,
            normal,
            curvature: plane.curvature,
        }
    } else {
        NormalPoint3f {
            position,
            normal: Vector3f::zeros(),
            curvature: 0.0,
        }
    }
}

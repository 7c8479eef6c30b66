//! Integration tests for pointkit-reconstruction
//!
//! These tests run MLS on synthetic surfaces and check that the smoothed
//! cloud works with the rest of the workspace.

use pointkit_core::{NormalPoint3f, Point3f, PointCloud, Vector3f};
use pointkit_reconstruction::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Points on a sphere with radial noise, evenly spread by a Fibonacci lattice
fn noisy_sphere(radius: f32, num_points: usize, noise: f32, seed: u64) -> PointCloud<Point3f> {
    let mut rng = StdRng::seed_from_u64(seed);
    let golden_angle = std::f32::consts::PI * (3.0 - 5.0_f32.sqrt());
    let mut cloud = PointCloud::with_capacity(num_points);

    for i in 0..num_points {
        let y = 1.0 - 2.0 * (i as f32 + 0.5) / num_points as f32;
        let r = (1.0 - y * y).sqrt();
        let theta = golden_angle * i as f32;
        let direction = Vector3f::new(theta.cos() * r, y, theta.sin() * r);
        let distance = radius + rng.gen_range(-noise..noise);
        cloud.push(Point3f::from(direction * distance));
    }
    cloud
}

fn mean_radial_error(points: impl Iterator<Item = Point3f>, radius: f32) -> f32 {
    let (sum, count) = points.fold((0.0, 0usize), |(s, c), p| (s + (p.coords.norm() - radius).abs(), c + 1));
    sum / count as f32
}

#[test]
fn test_mls_reduces_noise_on_sphere() {
    let radius = 0.1;
    let cloud = noisy_sphere(radius, 4000, 0.002, 3);
    let smoothed = mls_smooth(&cloud, &MlsConfig::default()).unwrap();
    assert_eq!(smoothed.len(), cloud.len());

    let before = mean_radial_error(cloud.iter().copied(), radius);
    let after = mean_radial_error(smoothed.iter().map(|p| p.position), radius);
    assert!(after < 0.6 * before, "before {} after {}", before, after);
}

#[test]
fn test_mls_normals_are_radial() {
    let cloud = noisy_sphere(0.1, 4000, 0.001, 5);
    let smoothed = mls_smooth(&cloud, &MlsConfig::default()).unwrap();

    for p in smoothed.iter() {
        let radial = p.position.coords.normalize();
        // the sensor sits at the centre, so normals point inwards
        assert!(p.normal.dot(&radial) < -0.95, "normal {:?} at {:?}", p.normal, p.position);
        assert!((p.normal.norm() - 1.0).abs() < 1e-4);
    }
}

#[test]
fn test_mls_output_survives_pcd_roundtrip() {
    let cloud = noisy_sphere(0.1, 1500, 0.001, 9);
    let smoothed = mls_smooth(&cloud, &MlsConfig::with_search_radius(0.04)).unwrap();

    let path = std::env::temp_dir().join(format!("pointkit_mls_{}.pcd", std::process::id()));
    pointkit_io::write_point_cloud(&smoothed, &path).unwrap();
    let loaded: PointCloud<NormalPoint3f> = pointkit_io::read_normal_point_cloud(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(loaded.points, smoothed.points);
}

#[test]
fn test_mls_config_from_radius_scales_gaussian() {
    let config = MlsConfig::with_search_radius(0.05);
    assert!((config.sqr_gauss_param - 0.0025).abs() < 1e-9);
    assert!(config.validate().is_ok());
}

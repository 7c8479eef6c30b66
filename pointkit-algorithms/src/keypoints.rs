//! Interest points and borders on range images
//!
//! The interest of a pixel combines two cues within a support sphere around
//! its point: how much the surface bends, and how much of the surrounding
//! window is not part of the same surface. Both cues are in `[0, 1]`.

use crate::normals::fit_plane_normal;
use crate::range_image::{RangeImage, RangePixel};
use pointkit_core::{Error, Point3f, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Parameters of the keypoint detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeypointConfig {
    /// Diameter of the sphere around a point that is considered, in metres
    pub support_size: f32,
    /// Pixels below this interest value are never keypoints
    pub min_interest_value: f32,
    /// Minimum keypoint spacing, as a fraction of `support_size`
    pub min_distance_between_interest_points: f32,
    /// Upper bound on the number of keypoints; 0 means unlimited
    pub max_no_of_interest_points: usize,
}

impl Default for KeypointConfig {
    fn default() -> Self {
        Self {
            support_size: 0.2,
            min_interest_value: 0.45,
            min_distance_between_interest_points: 0.25,
            max_no_of_interest_points: 0,
        }
    }
}

/// Window radius in pixels covering `radius` metres at distance `range`
fn window_radius(image: &RangeImage, radius: f32, range: f32) -> i64 {
    let angle = (radius / range).atan();
    let pixels = (angle / image.angular_resolution()).ceil() as i64;
    pixels.clamp(1, image.width().max(image.height()) as i64)
}

/// Per-pixel range change along x and y, from central differences where both
/// neighbours are valid and one-sided differences otherwise
fn range_gradient(image: &RangeImage, x: i64, y: i64, range: f32) -> (f32, f32) {
    let derivative = |dx: i64, dy: i64| {
        let before = image.get(x - dx, y - dy).and_then(RangePixel::range);
        let after = image.get(x + dx, y + dy).and_then(RangePixel::range);
        match (before, after) {
            (Some(b), Some(a)) => 0.5 * (a - b),
            (None, Some(a)) => a - range,
            (Some(b), None) => range - b,
            (None, None) => 0.0,
        }
    };
    (derivative(1, 0), derivative(0, 1))
}

/// Interest value of every pixel in row-major order (0 for invalid pixels).
///
/// A window pixel belongs to the surface of the centre pixel when its range
/// stays within `support_size / 2` of the range extrapolated from the centre's
/// range gradient; everything else counts towards the border score.
pub fn compute_interest_values(image: &RangeImage, config: &KeypointConfig) -> Result<Vec<f32>> {
    if !(config.support_size.is_finite() && config.support_size > 0.0) {
        return Err(Error::InvalidData(format!(
            "support size must be positive, got {}",
            config.support_size
        )));
    }
    let search_radius = 0.5 * config.support_size;

    let values = image
        .pixels()
        .par_iter()
        .enumerate()
        .map(|(idx, pixel)| {
            let RangePixel::Valid { position, range } = *pixel else {
                return 0.0;
            };
            let (x, y) = image.pixel_coordinates(idx);
            let (x, y) = (x as i64, y as i64);
            let w = window_radius(image, search_radius, range);
            let (gx, gy) = range_gradient(image, x, y, range);

            let mut total = 0usize;
            let mut non_surface = 0usize;
            let mut neighborhood: Vec<Point3f> = Vec::new();
            for dy in -w..=w {
                for dx in -w..=w {
                    total += 1;
                    match image.get(x + dx, y + dy) {
                        Some(RangePixel::Valid { position: q, range: r }) => {
                            let expected = range + gx * dx as f32 + gy * dy as f32;
                            if (r - expected).abs() > search_radius {
                                non_surface += 1;
                            } else if (q - position).norm() <= search_radius {
                                neighborhood.push(*q);
                            }
                        }
                        _ => non_surface += 1,
                    }
                }
            }

            let border_score = non_surface as f32 / total as f32;
            let surface_change = if neighborhood.len() >= 3 {
                (3.0 * fit_plane_normal(&neighborhood).curvature).min(1.0)
            } else {
                0.0
            };
            border_score.max(surface_change)
        })
        .collect();
    Ok(values)
}

/// Detect keypoints; returns pixel indices, most interesting first.
///
/// Candidates above `min_interest_value` are accepted greedily in order of
/// decreasing interest, skipping any whose point lies closer than
/// `min_distance_between_interest_points * support_size` to an accepted one.
pub fn detect_keypoints(image: &RangeImage, config: &KeypointConfig) -> Result<Vec<usize>> {
    let interest = compute_interest_values(image, config)?;

    let mut candidates: Vec<(usize, f32)> = interest
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v >= config.min_interest_value && v > 0.0)
        .map(|(i, &v)| (i, v))
        .collect();
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let min_distance = config.min_distance_between_interest_points * config.support_size;
    let min_distance_sq = min_distance * min_distance;
    let mut keypoints: Vec<usize> = Vec::new();
    let mut accepted: Vec<Point3f> = Vec::new();

    for (idx, _) in candidates {
        if config.max_no_of_interest_points > 0 && keypoints.len() >= config.max_no_of_interest_points {
            break;
        }
        let Some(position) = image.pixels()[idx].position() else {
            continue;
        };
        if accepted.iter().all(|a| (a - position).norm_squared() >= min_distance_sq) {
            keypoints.push(idx);
            accepted.push(position);
        }
    }

    log::debug!(
        "{} keypoints from {} valid pixels",
        keypoints.len(),
        image.valid_count()
    );
    Ok(keypoints)
}

/// Kind of border a pixel lies on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BorderKind {
    /// Foreground surface next to unobserved space or a farther surface
    Obstacle,
    /// Background surface next to a closer surface that occludes it
    Shadow,
}

/// A border pixel of a range image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BorderPoint {
    pub x: usize,
    pub y: usize,
    pub kind: BorderKind,
    pub position: Point3f,
}

/// Classify border pixels by comparing each valid pixel to its four direct
/// neighbours. A neighbour outside the image, unobserved or beyond range, or
/// more than `min_range_jump` farther away makes the pixel an obstacle border;
/// a neighbour more than `min_range_jump` closer makes it a shadow border.
/// Obstacle takes precedence when both apply.
pub fn extract_borders(image: &RangeImage, min_range_jump: f32) -> Vec<BorderPoint> {
    let mut borders = Vec::new();
    for y in 0..image.height() {
        for x in 0..image.width() {
            let Some(&RangePixel::Valid { position, range }) = image.get(x as i64, y as i64) else {
                continue;
            };

            let mut obstacle = false;
            let mut shadow = false;
            for (dx, dy) in [(-1i64, 0i64), (1, 0), (0, -1), (0, 1)] {
                match image.get(x as i64 + dx, y as i64 + dy) {
                    Some(RangePixel::Valid { range: r, .. }) => {
                        if *r > range + min_range_jump {
                            obstacle = true;
                        } else if *r < range - min_range_jump {
                            shadow = true;
                        }
                    }
                    _ => obstacle = true,
                }
            }

            let kind = if obstacle {
                BorderKind::Obstacle
            } else if shadow {
                BorderKind::Shadow
            } else {
                continue;
            };
            borders.push(BorderPoint { x, y, kind, position });
        }
    }
    borders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range_image::RangeImageConfig;
    use pointkit_core::PointCloud;

    fn rectangle(z: f32) -> PointCloud<Point3f> {
        let mut cloud = PointCloud::new();
        for i in 0..=100 {
            for j in 0..=100 {
                let x = -0.5 + i as f32 * 0.01;
                let y = -0.5 + j as f32 * 0.01;
                cloud.push(Point3f::new(x, y, z - y));
            }
        }
        cloud
    }

    fn image_of(cloud: &PointCloud<Point3f>) -> RangeImage {
        RangeImage::from_point_cloud(cloud, &RangeImageConfig::default()).unwrap()
    }

    #[test]
    fn test_keypoints_lie_on_the_rectangle_border() {
        let image = image_of(&rectangle(2.0));
        let keypoints = detect_keypoints(&image, &KeypointConfig::default()).unwrap();

        assert!(!keypoints.is_empty());
        for &idx in &keypoints {
            let p = image.pixels()[idx].position().unwrap();
            assert!(p.x.abs() > 0.4 || p.y.abs() > 0.4, "interior keypoint at {:?}", p);
        }
    }

    #[test]
    fn test_keypoints_respect_spacing_and_limit() {
        let image = image_of(&rectangle(2.0));
        let config = KeypointConfig {
            max_no_of_interest_points: 3,
            ..Default::default()
        };
        let keypoints = detect_keypoints(&image, &config).unwrap();
        assert!(keypoints.len() <= 3);

        let unlimited = detect_keypoints(&image, &KeypointConfig::default()).unwrap();
        let min_distance = 0.25 * 0.2;
        for (i, &a) in unlimited.iter().enumerate() {
            for &b in &unlimited[i + 1..] {
                let pa = image.pixels()[a].position().unwrap();
                let pb = image.pixels()[b].position().unwrap();
                assert!((pa - pb).norm() >= min_distance - 1e-6);
            }
        }
    }

    #[test]
    fn test_interior_of_plane_is_not_interesting() {
        let image = image_of(&rectangle(2.0));
        let interest = compute_interest_values(&image, &KeypointConfig::default()).unwrap();
        let (x, y, _) = image.project(&Point3f::new(0.0, 0.0, 2.0)).unwrap();
        assert!(interest[image.pixel_index(x, y)] < 0.05);
    }

    #[test]
    fn test_invalid_support_size() {
        let image = image_of(&rectangle(2.0));
        let config = KeypointConfig {
            support_size: 0.0,
            ..Default::default()
        };
        assert!(detect_keypoints(&image, &config).is_err());
    }

    #[test]
    fn test_borders_of_occluding_rectangle() {
        let mut cloud = rectangle(3.0);
        // small square in front of the large one
        for i in 0..=20 {
            for j in 0..=20 {
                cloud.push(Point3f::new(-0.1 + i as f32 * 0.01, -0.1 + j as f32 * 0.01, 1.5));
            }
        }
        let image = image_of(&cloud);
        let borders = extract_borders(&image, 0.3);

        let obstacles: Vec<&BorderPoint> = borders.iter().filter(|b| b.kind == BorderKind::Obstacle).collect();
        let shadows: Vec<&BorderPoint> = borders.iter().filter(|b| b.kind == BorderKind::Shadow).collect();
        assert!(!obstacles.is_empty());
        assert!(!shadows.is_empty());
        // shadow borders are on the background surface
        assert!(shadows.iter().all(|b| b.position.z > 2.0));
        // the front square is outlined by obstacle borders
        assert!(obstacles.iter().any(|b| (b.position.z - 1.5).abs() < 1e-6));
    }
}

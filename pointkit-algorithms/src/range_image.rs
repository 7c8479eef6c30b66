//! Spherical range images
//!
//! A range image stores, for every angular pixel seen from a sensor pose, the
//! closest point observed in that direction. Pixels are either unobserved,
//! known to be beyond the sensor's maximum range, or hold a valid point.

use pointkit_core::{Error, Isometry3, Point3f, PointCloud, Result};
use nalgebra::{Matrix3, Rotation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Axis convention of the sensor frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateFrame {
    /// x right, y down, z forward
    Camera,
    /// x forward, y left, z up
    Laser,
}

impl CoordinateFrame {
    /// Rotation taking sensor-frame coordinates to camera convention
    fn to_camera(self) -> UnitQuaternion<f32> {
        match self {
            CoordinateFrame::Camera => UnitQuaternion::identity(),
            CoordinateFrame::Laser => {
                let m = Matrix3::new(
                    0.0, -1.0, 0.0,
                    0.0, 0.0, -1.0,
                    1.0, 0.0, 0.0,
                );
                UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(m))
            }
        }
    }
}

impl std::str::FromStr for CoordinateFrame {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "0" | "camera" => Ok(CoordinateFrame::Camera),
            "1" | "laser" => Ok(CoordinateFrame::Laser),
            other => Err(Error::InvalidData(format!("unknown coordinate frame '{}'", other))),
        }
    }
}

/// Parameters for building a range image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeImageConfig {
    /// Size of one pixel in radians, both directions
    pub angular_resolution: f32,
    /// Horizontal field of view in radians
    pub max_angle_width: f32,
    /// Vertical field of view in radians
    pub max_angle_height: f32,
    /// Pose of the sensor in cloud coordinates; `None` uses the cloud's own
    pub sensor_pose: Option<Isometry3<f32>>,
    pub coordinate_frame: CoordinateFrame,
    /// Points within this distance of the closest range in a pixel are averaged
    pub noise_level: f32,
    /// Points closer to the sensor than this are ignored
    pub min_range: f32,
    /// Unobserved pixels kept around the observed area
    pub border_size: usize,
}

impl Default for RangeImageConfig {
    fn default() -> Self {
        Self {
            angular_resolution: 0.5f32.to_radians(),
            max_angle_width: 2.0 * PI,
            max_angle_height: PI,
            sensor_pose: None,
            coordinate_frame: CoordinateFrame::Camera,
            noise_level: 0.0,
            min_range: 0.0,
            border_size: 1,
        }
    }
}

impl RangeImageConfig {
    fn validate(&self) -> Result<()> {
        if !(self.angular_resolution.is_finite() && self.angular_resolution > 0.0) {
            return Err(Error::InvalidData(format!(
                "angular resolution must be positive, got {}",
                self.angular_resolution
            )));
        }
        if !(self.max_angle_width > 0.0 && self.max_angle_width <= 2.0 * PI) {
            return Err(Error::InvalidData(format!(
                "max_angle_width must be in (0, 2pi], got {}",
                self.max_angle_width
            )));
        }
        if !(self.max_angle_height > 0.0 && self.max_angle_height <= PI) {
            return Err(Error::InvalidData(format!(
                "max_angle_height must be in (0, pi], got {}",
                self.max_angle_height
            )));
        }
        if !(self.noise_level >= 0.0 && self.min_range >= 0.0) {
            return Err(Error::InvalidData(
                "noise_level and min_range must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// State of a single range image pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangePixel {
    Unobserved,
    /// Something was measured in this direction, but beyond the maximum range
    FarRange,
    Valid { position: Point3f, range: f32 },
}

impl RangePixel {
    pub fn is_valid(&self) -> bool {
        matches!(self, RangePixel::Valid { .. })
    }

    pub fn is_observed(&self) -> bool {
        !matches!(self, RangePixel::Unobserved)
    }

    pub fn range(&self) -> Option<f32> {
        match self {
            RangePixel::Valid { range, .. } => Some(*range),
            _ => None,
        }
    }

    pub fn position(&self) -> Option<Point3f> {
        match self {
            RangePixel::Valid { position, .. } => Some(*position),
            _ => None,
        }
    }
}

/// A cropped window of a spherical range image
#[derive(Debug, Clone)]
pub struct RangeImage {
    width: usize,
    height: usize,
    pixels: Vec<RangePixel>,
    angular_resolution: f32,
    max_angle_width: f32,
    max_angle_height: f32,
    /// Column and row of pixel (0, 0) in the uncropped image
    offset_x: i64,
    offset_y: i64,
    to_range_image_system: Isometry3<f32>,
}

impl RangeImage {
    /// Project `cloud` into a range image seen from the configured sensor pose
    pub fn from_point_cloud(cloud: &PointCloud<Point3f>, config: &RangeImageConfig) -> Result<Self> {
        config.validate()?;
        if cloud.is_empty() {
            return Err(Error::EmptyCloud);
        }

        let sensor_pose = config.sensor_pose.unwrap_or_else(|| cloud.sensor_pose());
        let to_range_image_system = Isometry3::from_parts(
            nalgebra::Translation3::identity(),
            config.coordinate_frame.to_camera(),
        ) * sensor_pose.inverse();

        let mut image = Self {
            width: 0,
            height: 0,
            pixels: Vec::new(),
            angular_resolution: config.angular_resolution,
            max_angle_width: config.max_angle_width,
            max_angle_height: config.max_angle_height,
            offset_x: 0,
            offset_y: 0,
            to_range_image_system,
        };

        let projected: Vec<(i64, i64, f32, Point3f)> = cloud
            .iter()
            .filter(|p| p.coords.iter().all(|c| c.is_finite()))
            .filter_map(|p| {
                let (col, row, range) = image.project_full(p)?;
                (range >= config.min_range && range > 0.0).then_some((col, row, range, *p))
            })
            .collect();

        if projected.is_empty() {
            log::debug!("range image: no point of {} projects into the image", cloud.len());
            return Ok(image);
        }

        let border = config.border_size as i64;
        let (min_col, max_col, min_row, max_row) = projected.iter().fold(
            (i64::MAX, i64::MIN, i64::MAX, i64::MIN),
            |(a, b, c, d), &(col, row, _, _)| (a.min(col), b.max(col), c.min(row), d.max(row)),
        );
        image.offset_x = min_col - border;
        image.offset_y = min_row - border;
        image.width = (max_col - min_col + 1 + 2 * border) as usize;
        image.height = (max_row - min_row + 1 + 2 * border) as usize;
        image.pixels = vec![RangePixel::Unobserved; image.width * image.height];

        // z-buffer, averaging points within the noise level of the closest one
        let mut counts = vec![0u32; image.pixels.len()];
        for (col, row, range, point) in projected {
            let idx = image.pixel_index(
                (col - image.offset_x) as usize,
                (row - image.offset_y) as usize,
            );
            match image.pixels[idx] {
                RangePixel::Valid { position, range: current } => {
                    if range < current - config.noise_level {
                        image.pixels[idx] = RangePixel::Valid { position: point, range };
                        counts[idx] = 1;
                    } else if (range - current).abs() <= config.noise_level {
                        let n = counts[idx] as f32;
                        let averaged = Point3f::from((position.coords * n + point.coords) / (n + 1.0));
                        let averaged_range = image.range_to(&averaged);
                        image.pixels[idx] = RangePixel::Valid {
                            position: averaged,
                            range: averaged_range,
                        };
                        counts[idx] += 1;
                    }
                }
                _ => {
                    image.pixels[idx] = RangePixel::Valid { position: point, range };
                    counts[idx] = 1;
                }
            }
        }

        log::debug!(
            "range image {}x{} from {} points",
            image.width,
            image.height,
            cloud.len()
        );
        Ok(image)
    }

    /// Mark the pixels hit by far-range readings that are still unobserved
    pub fn integrate_far_ranges(&mut self, far_ranges: &PointCloud<Point3f>) {
        let mut integrated = 0;
        for point in far_ranges.iter() {
            if !point.coords.iter().all(|c| c.is_finite()) {
                continue;
            }
            let Some((x, y, _)) = self.project(point) else {
                continue;
            };
            let idx = self.pixel_index(x, y);
            if self.pixels[idx] == RangePixel::Unobserved {
                self.pixels[idx] = RangePixel::FarRange;
                integrated += 1;
            }
        }
        log::debug!("integrated {} far-range pixels", integrated);
    }

    /// Treat every unobserved pixel as lying beyond the maximum range
    pub fn set_unseen_to_max_range(&mut self) {
        for pixel in &mut self.pixels {
            if *pixel == RangePixel::Unobserved {
                *pixel = RangePixel::FarRange;
            }
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn angular_resolution(&self) -> f32 {
        self.angular_resolution
    }

    pub fn pixels(&self) -> &[RangePixel] {
        &self.pixels
    }

    pub fn pixel_index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    pub fn pixel_coordinates(&self, index: usize) -> (usize, usize) {
        (index % self.width.max(1), index / self.width.max(1))
    }

    /// Pixel at column `x`, row `y`; `None` outside the image
    pub fn get(&self, x: i64, y: i64) -> Option<&RangePixel> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        self.pixels.get(self.pixel_index(x as usize, y as usize))
    }

    pub fn valid_count(&self) -> usize {
        self.pixels.iter().filter(|p| p.is_valid()).count()
    }

    /// Valid points in row-major pixel order
    pub fn to_point_cloud(&self) -> PointCloud<Point3f> {
        self.pixels.iter().filter_map(RangePixel::position).collect()
    }

    /// Pixel coordinates and range of `point` within this image, or `None` if
    /// it falls outside the image or the field of view
    pub fn project(&self, point: &Point3f) -> Option<(usize, usize, f32)> {
        let (col, row, range) = self.project_full(point)?;
        let x = col - self.offset_x;
        let y = row - self.offset_y;
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some((x as usize, y as usize, range))
    }

    fn range_to(&self, point: &Point3f) -> f32 {
        (self.to_range_image_system * point).coords.norm()
    }

    /// Column and row in the uncropped image plus the range
    fn project_full(&self, point: &Point3f) -> Option<(i64, i64, f32)> {
        let local = self.to_range_image_system * point;
        let range = local.coords.norm();
        if range == 0.0 {
            return None;
        }
        let angle_x = local.x.atan2(local.z);
        let angle_y = (local.y / range).clamp(-1.0, 1.0).asin();

        let half_width = 0.5 * self.max_angle_width;
        let half_height = 0.5 * self.max_angle_height;
        if angle_x < -half_width || angle_x >= half_width || angle_y.abs() > half_height {
            return None;
        }

        let col = ((angle_x + half_width) / self.angular_resolution).floor() as i64;
        let row = ((angle_y + half_height) / self.angular_resolution).floor() as i64;
        Some((col, row, range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pointkit_core::Vector3f;
    use std::f32::consts::FRAC_PI_2;

    /// The tilted plane used by the keypoint demo
    pub(crate) fn tilted_plane() -> PointCloud<Point3f> {
        let mut cloud = PointCloud::new();
        let mut y = -0.5;
        while y <= 0.5 {
            let mut x = -0.5;
            while x <= 0.5 {
                cloud.push(Point3f::new(x, y, 2.0 - y));
                x += 0.01;
            }
            y += 0.01;
        }
        cloud
    }

    #[test]
    fn test_plane_fills_a_cropped_window() {
        let image = RangeImage::from_point_cloud(&tilted_plane(), &RangeImageConfig::default()).unwrap();

        assert!(image.width() > 20 && image.width() < 200);
        assert!(image.height() > 20 && image.height() < 200);
        // border row is unobserved
        assert!(!image.get(0, 0).unwrap().is_observed());
        let (cx, cy, _) = image.project(&Point3f::new(0.0, 0.0, 2.0)).unwrap();
        assert!(image.get(cx as i64, cy as i64).unwrap().is_valid());
        assert!(image.valid_count() > 100);
    }

    #[test]
    fn test_z_buffer_keeps_closest_point() {
        let cloud = PointCloud::from_points(vec![
            Point3f::new(0.0, 0.0, 3.0),
            Point3f::new(0.0, 0.0, 1.0),
            Point3f::new(0.0, 0.0, 2.0),
        ]);
        let image = RangeImage::from_point_cloud(&cloud, &RangeImageConfig::default()).unwrap();
        assert_eq!(image.valid_count(), 1);
        let pixel = image.pixels().iter().find(|p| p.is_valid()).unwrap();
        assert_relative_eq!(pixel.range().unwrap(), 1.0);
    }

    #[test]
    fn test_noise_level_averages_close_points() {
        let cloud = PointCloud::from_points(vec![
            Point3f::new(0.0, 0.0, 1.0),
            Point3f::new(0.0, 0.0, 1.02),
        ]);
        let config = RangeImageConfig {
            noise_level: 0.05,
            ..Default::default()
        };
        let image = RangeImage::from_point_cloud(&cloud, &config).unwrap();
        let pixel = image.pixels().iter().find(|p| p.is_valid()).unwrap();
        assert_relative_eq!(pixel.range().unwrap(), 1.01, epsilon = 1e-5);
    }

    #[test]
    fn test_min_range_discards_close_points() {
        let cloud = PointCloud::from_points(vec![
            Point3f::new(0.0, 0.0, 0.1),
            Point3f::new(0.1, 0.0, 2.0),
        ]);
        let config = RangeImageConfig {
            min_range: 0.5,
            ..Default::default()
        };
        let image = RangeImage::from_point_cloud(&cloud, &config).unwrap();
        assert_eq!(image.valid_count(), 1);
    }

    #[test]
    fn test_laser_frame_looks_along_x() {
        let cloud = PointCloud::from_points(vec![Point3f::new(2.0, 0.0, 0.0)]);
        let config = RangeImageConfig {
            coordinate_frame: CoordinateFrame::Laser,
            border_size: 0,
            ..Default::default()
        };
        let image = RangeImage::from_point_cloud(&cloud, &config).unwrap();
        assert_eq!((image.width(), image.height()), (1, 1));
        // forward is the centre of the field of view
        let (col, row, range) = image.project_full(&Point3f::new(2.0, 0.0, 0.0)).unwrap();
        assert_eq!(col, (PI / config.angular_resolution).floor() as i64);
        assert_eq!(row, (FRAC_PI_2 / config.angular_resolution).floor() as i64);
        assert_relative_eq!(range, 2.0);
    }

    #[test]
    fn test_sensor_pose_from_cloud() {
        let cloud = PointCloud::from_points(vec![Point3f::new(1.0, 0.0, 3.0)])
            .with_sensor_pose(Point3f::new(1.0, 0.0, 0.0), UnitQuaternion::identity());
        let image = RangeImage::from_point_cloud(&cloud, &RangeImageConfig::default()).unwrap();
        let pixel = image.pixels().iter().find(|p| p.is_valid()).unwrap();
        assert_relative_eq!(pixel.range().unwrap(), 3.0, epsilon = 1e-6);
        assert_relative_eq!(pixel.position().unwrap().coords, Vector3f::new(1.0, 0.0, 3.0));
    }

    #[test]
    fn test_far_ranges_and_unseen() {
        let mut image = RangeImage::from_point_cloud(&tilted_plane(), &RangeImageConfig::default()).unwrap();
        // beside the narrow far edge of the plane, inside the cropped window
        let far = PointCloud::from_points(vec![Point3f::new(0.69, -0.49, 2.5)]);
        let before = image.pixels().iter().filter(|p| **p == RangePixel::FarRange).count();
        assert_eq!(before, 0);

        image.integrate_far_ranges(&far);
        let (x, y, _) = image.project(&far[0]).unwrap();
        assert_eq!(*image.get(x as i64, y as i64).unwrap(), RangePixel::FarRange);

        image.set_unseen_to_max_range();
        assert!(image.pixels().iter().all(|p| p.is_observed()));
    }

    #[test]
    fn test_invalid_config_and_empty_cloud() {
        let config = RangeImageConfig {
            angular_resolution: 0.0,
            ..Default::default()
        };
        assert!(RangeImage::from_point_cloud(&tilted_plane(), &config).is_err());
        assert!(matches!(
            RangeImage::from_point_cloud(&PointCloud::new(), &RangeImageConfig::default()),
            Err(Error::EmptyCloud)
        ));
    }
}

//! Range Image Keypoints Example
//!
//! Builds a spherical range image from a PCD file, or from a generated tilted
//! rectangle when no file is given, and detects interest points on it.
//!
//! Usage:
//!   range_keypoints scene.pcd -r 0.5 -s 0.2
//!   range_keypoints -m                 # generated example scene

use anyhow::{Context, Result};
use clap::Parser;
use pointkit_algorithms::{
    detect_keypoints, extract_borders, BorderKind, CoordinateFrame, KeypointConfig, RangeImage,
    RangeImageConfig,
};
use pointkit_core::{Point3f, PointCloud};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about = "Detect keypoints on a range image", long_about = None)]
struct Args {
    /// Angular resolution in degrees
    #[arg(short = 'r', long, default_value_t = 0.5)]
    angular_resolution: f32,

    /// Coordinate frame of the sensor (0/camera or 1/laser)
    #[arg(short = 'c', long, default_value = "camera")]
    coordinate_frame: CoordinateFrame,

    /// Treat all unseen points as far ranges
    #[arg(short = 'm', long)]
    unseen_to_max_range: bool,

    /// Support size of the interest operator in metres
    #[arg(short = 's', long, default_value_t = 0.2)]
    support_size: f32,

    /// Write the keypoints to this PCD file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Scene to load; a generated example is used when omitted
    file: Option<PathBuf>,
}

/// Rectangle tilted away from the sensor, two metres ahead
fn example_scene() -> PointCloud<Point3f> {
    let mut cloud = PointCloud::new();
    for i in 0..=100 {
        for j in 0..=100 {
            let x = -0.5 + i as f32 * 0.01;
            let y = -0.5 + j as f32 * 0.01;
            cloud.push(Point3f::new(x, y, 2.0 - y));
        }
    }
    cloud
}

fn far_ranges_path(file: &Path) -> PathBuf {
    let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("scene");
    file.with_file_name(format!("{}_far_ranges.pcd", stem))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut unseen_to_max_range = args.unseen_to_max_range;
    let (cloud, far_ranges) = match &args.file {
        Some(file) => {
            let cloud = pointkit_io::read_point_cloud(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let far_file = far_ranges_path(file);
            let far_ranges = if far_file.exists() {
                Some(
                    pointkit_io::read_point_cloud(&far_file)
                        .with_context(|| format!("failed to read {}", far_file.display()))?,
                )
            } else {
                log::info!("far ranges file {} does not exist", far_file.display());
                None
            };
            (cloud, far_ranges)
        }
        None => {
            log::info!("no PCD file given, generating example scene");
            unseen_to_max_range = true;
            (example_scene(), None)
        }
    };

    let config = RangeImageConfig {
        angular_resolution: args.angular_resolution.to_radians(),
        coordinate_frame: args.coordinate_frame,
        ..Default::default()
    };
    let mut image = RangeImage::from_point_cloud(&cloud, &config).context("failed to build range image")?;
    if let Some(far_ranges) = &far_ranges {
        image.integrate_far_ranges(far_ranges);
    }
    if unseen_to_max_range {
        image.set_unseen_to_max_range();
    }
    println!(
        "Range image: {}x{} pixels, {} valid",
        image.width(),
        image.height(),
        image.valid_count()
    );

    let keypoint_config = KeypointConfig {
        support_size: args.support_size,
        ..Default::default()
    };
    let keypoints = detect_keypoints(&image, &keypoint_config).context("keypoint detection failed")?;
    println!("Found {} key points", keypoints.len());

    let borders = extract_borders(&image, 0.5 * args.support_size);
    let obstacles = borders.iter().filter(|b| b.kind == BorderKind::Obstacle).count();
    println!(
        "Border pixels: {} obstacle, {} shadow",
        obstacles,
        borders.len() - obstacles
    );

    if let Some(output) = &args.output {
        let keypoint_cloud: PointCloud<Point3f> = keypoints
            .iter()
            .filter_map(|&idx| image.pixels()[idx].position())
            .collect();
        pointkit_io::write_point_cloud(&keypoint_cloud, output)
            .with_context(|| format!("failed to write {}", output.display()))?;
        log::info!("saved {} keypoints to {}", keypoint_cloud.len(), output.display());
    }
    Ok(())
}

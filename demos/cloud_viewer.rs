//! Cloud Viewer Example
//!
//! Loads a (coloured) PCD file and prints what a viewer would show about it:
//! point count, bounds, centroid and the sensor pose.

use anyhow::{Context, Result};
use clap::Parser;
use pointkit_core::PointCloud;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Summarise a point cloud file", long_about = None)]
struct Args {
    /// PCD file to load
    file: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cloud = pointkit_io::read_colored_point_cloud(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    log::info!("loaded {} points from {}", cloud.len(), args.file.display());

    println!("Cloud: {}", args.file.display());
    println!("  points: {}", cloud.len());

    if let Some((min, max)) = cloud.bounding_box() {
        println!("  bounds: [{:.4}, {:.4}, {:.4}] .. [{:.4}, {:.4}, {:.4}]", min.x, min.y, min.z, max.x, max.y, max.z);
    }
    if let Some(c) = cloud.centroid() {
        println!("  centroid: ({:.4}, {:.4}, {:.4})", c.x, c.y, c.z);
    }

    let distinct_colors = distinct_colors(&cloud);
    println!("  distinct colours: {}", distinct_colors);

    let o = cloud.sensor_origin;
    let (roll, pitch, yaw) = cloud.sensor_orientation.euler_angles();
    println!("  sensor origin: ({:.4}, {:.4}, {:.4})", o.x, o.y, o.z);
    println!(
        "  sensor orientation (roll, pitch, yaw): ({:.2}, {:.2}, {:.2}) deg",
        roll.to_degrees(),
        pitch.to_degrees(),
        yaw.to_degrees()
    );
    Ok(())
}

fn distinct_colors(cloud: &PointCloud<pointkit_core::ColoredPoint3f>) -> usize {
    let mut colors: Vec<[u8; 4]> = cloud.iter().map(|p| p.color).collect();
    colors.sort_unstable();
    colors.dedup();
    colors.len()
}

//! Moving Least Squares Example
//!
//! Smooths a noisy PCD file with MLS and saves the resampled points with
//! their normals.

use anyhow::{Context, Result};
use clap::Parser;
use pointkit_reconstruction::{mls_smooth, MlsConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Smooth a point cloud with moving least squares", long_about = None)]
struct Args {
    /// PCD file to load
    file: PathBuf,

    /// Search radius in metres
    #[arg(long, default_value_t = 0.03)]
    radius: f32,

    /// Order of the fitted polynomial
    #[arg(long, default_value_t = 2)]
    order: usize,

    /// Output PCD file
    #[arg(short, long, default_value = "target-mls.pcd")]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cloud = pointkit_io::read_point_cloud(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let config = MlsConfig {
        polynomial_order: args.order,
        ..MlsConfig::with_search_radius(args.radius)
    };
    let smoothed = mls_smooth(&cloud, &config).context("MLS smoothing failed")?;
    println!("Smoothed {} of {} points", smoothed.len(), cloud.len());

    pointkit_io::write_point_cloud(&smoothed, &args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    log::info!("saved {}", args.output.display());
    Ok(())
}

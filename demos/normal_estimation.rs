//! Normal Estimation Example
//!
//! Estimates surface normals of a PCD file with a fixed search radius and
//! optionally saves the cloud together with its normals.

use anyhow::{Context, Result};
use clap::Parser;
use pointkit_algorithms::{estimate_normals_radius, normals_to_cloud};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about = "Estimate surface normals", long_about = None)]
struct Args {
    /// PCD file to load
    file: PathBuf,

    /// Neighbourhood radius in metres
    #[arg(long, default_value_t = 0.03)]
    radius: f32,

    /// Write points with normals to this PCD file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cloud = pointkit_io::read_point_cloud(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let start = Instant::now();
    let normals = estimate_normals_radius(&cloud, args.radius, true).context("normal estimation failed")?;
    log::info!("estimated {} normals in {:?}", normals.len(), start.elapsed());

    let mean_curvature = normals.iter().map(|n| n.curvature).sum::<f32>() / normals.len() as f32;
    println!("Normals: {}", normals.len());
    println!("Mean curvature: {:.6}", mean_curvature);

    if let Some(output) = &args.output {
        let with_normals = normals_to_cloud(&cloud, &normals)?;
        pointkit_io::write_point_cloud(&with_normals, output)
            .with_context(|| format!("failed to write {}", output.display()))?;
        log::info!("saved {}", output.display());
    }
    Ok(())
}

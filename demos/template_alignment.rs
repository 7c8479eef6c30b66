//! Template Alignment Example
//!
//! Finds which of a set of object templates best matches a scene and where it
//! sits. The scene is cropped in depth and downsampled, every template is
//! registered onto it with FPFH/SAC-IA, and the best fitting template is saved
//! in scene coordinates.
//!
//! Usage:
//!   template_alignment object_templates.txt person.pcd
//!   template_alignment object_templates.txt person.pcd --seed 42 --parallel

use anyhow::{Context, Result};
use clap::Parser;
use pointkit_alignment::{
    save_aligned_template, select_best, FeatureCloud, PipelineConfig, TemplateAlignment,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Align object templates to a scene", long_about = None)]
struct Args {
    /// Text file listing one template PCD per line
    templates: PathBuf,

    /// Scene PCD file
    target: PathBuf,

    /// TOML file with pipeline settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for reproducible registration
    #[arg(long)]
    seed: Option<u64>,

    /// Align templates on all cores
    #[arg(long)]
    parallel: bool,

    /// Where to save the aligned best template
    #[arg(short, long, default_value = "output.pcd")]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if args.seed.is_some() {
        config.alignment.seed = args.seed;
    }

    // Templates
    let template_paths = pointkit_io::read_path_list(&args.templates)
        .with_context(|| format!("failed to read template list {}", args.templates.display()))?;
    let mut templates = Vec::with_capacity(template_paths.len());
    for path in &template_paths {
        let mut template = FeatureCloud::new(config.features.clone());
        template
            .load_input_cloud(path)
            .with_context(|| format!("failed to prepare template {}", path.display()))?;
        log::info!("template {}: {} points", path.display(), template.len());
        templates.push(template);
    }

    // Scene: depth cut, then downsampling
    let scene = pointkit_io::read_point_cloud(&args.target)
        .with_context(|| format!("failed to read {}", args.target.display()))?;
    let filtered = config
        .preprocessing
        .apply(&scene)
        .context("failed to preprocess the target cloud")?;
    log::info!("target: {} points, {} after filtering", scene.len(), filtered.len());
    pointkit_io::write_point_cloud(&filtered, "pass_through_voxel.pcd")
        .context("failed to save pass_through_voxel.pcd")?;

    let target = FeatureCloud::from_cloud(filtered, config.features.clone())
        .context("failed to prepare the target cloud")?;

    let mut matcher = TemplateAlignment::new(config.alignment.clone())?;
    matcher.set_target_cloud(target);
    for template in templates {
        matcher.add_template_cloud(template);
    }

    let (best_index, best) = if args.parallel {
        select_best(&matcher.align_all_parallel()?)?
    } else {
        matcher.find_best_alignment()?
    };

    println!("Best fitness score: {}", best.fitness_score);
    println!("Best template: {} ({})", best_index, template_paths[best_index].display());

    let transform = best.final_transformation;
    let r = transform.rotation_matrix();
    let t = transform.translation_vector();
    let ypr = transform.euler_angles_zyx();
    println!();
    println!("    | {:6.3} {:6.3} {:6.3} |", r[(0, 0)], r[(0, 1)], r[(0, 2)]);
    println!("R = | {:6.3} {:6.3} {:6.3} |", r[(1, 0)], r[(1, 1)], r[(1, 2)]);
    println!("    | {:6.3} {:6.3} {:6.3} |", r[(2, 0)], r[(2, 1)], r[(2, 2)]);
    println!();
    println!(
        "yaw, pitch, roll = < {:.3}, {:.3}, {:.3} > deg",
        ypr.x.to_degrees(),
        ypr.y.to_degrees(),
        ypr.z.to_degrees()
    );
    println!("t = < {:.3}, {:.3}, {:.3} >", t.x, t.y, t.z);

    save_aligned_template(&matcher.templates()[best_index], &best, &args.output)
        .with_context(|| format!("failed to save {}", args.output.display()))?;
    log::info!("saved aligned template to {}", args.output.display());
    Ok(())
}

//! # pointkit Alignment
//!
//! Template matching for point clouds: a [`FeatureCloud`] bundles a cloud with
//! its surface normals and FPFH descriptors, and [`TemplateAlignment`] registers
//! a set of templates onto a target with SAC-IA and picks the best fit.
//!
//! ```no_run
//! use pointkit_alignment::*;
//!
//! fn main() -> Result<()> {
//!     let mut target = FeatureCloud::default();
//!     target.load_input_cloud("scene.pcd")?;
//!
//!     let mut matcher = TemplateAlignment::new(TemplateAlignmentConfig::default())?;
//!     matcher.set_target_cloud(target);
//!     for path in ["template_0.pcd", "template_1.pcd"] {
//!         let mut template = FeatureCloud::default();
//!         template.load_input_cloud(path)?;
//!         matcher.add_template_cloud(template);
//!     }
//!
//!     let (index, result) = matcher.find_best_alignment()?;
//!     println!("template {} fits with score {}", index, result.fitness_score);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod feature_cloud;
pub mod template_alignment;

// Re-export commonly used items
pub use config::*;
pub use error::*;
pub use feature_cloud::*;
pub use template_alignment::*;

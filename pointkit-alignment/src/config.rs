//! Pipeline configuration loaded from TOML
//!
//! ```toml
//! [preprocessing]
//! depth_limit = 1.0
//! voxel_size = 0.005
//!
//! [features]
//! normal_radius = 0.02
//! feature_radius = 0.02
//!
//! [alignment]
//! max_iterations = 500
//! seed = 42
//! ```
//!
//! Missing sections and keys keep their defaults.

use crate::error::{AlignmentError, Result};
use crate::feature_cloud::FeatureCloudConfig;
use crate::template_alignment::TemplateAlignmentConfig;
use pointkit_algorithms::{pass_through_filter, voxel_grid_filter, Axis};
use pointkit_core::{Point3f, PointCloud};
use pointkit_io::IoError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Target cloud clean-up before features are computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Points with z outside `[0, depth_limit]` are removed
    pub depth_limit: f32,
    /// Leaf size of the voxel grid downsampling
    pub voxel_size: f32,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            depth_limit: 1.0,
            voxel_size: 0.005,
        }
    }
}

impl PreprocessingConfig {
    /// Depth cut followed by voxel grid downsampling
    pub fn apply(&self, cloud: &PointCloud<Point3f>) -> pointkit_core::Result<PointCloud<Point3f>> {
        let cropped = pass_through_filter(cloud, Axis::Z, 0.0, self.depth_limit, false)?;
        voxel_grid_filter(&cropped, self.voxel_size)
    }
}

/// Settings of the whole template alignment pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub preprocessing: PreprocessingConfig,
    pub features: FeatureCloudConfig,
    pub alignment: TemplateAlignmentConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| AlignmentError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AlignmentError::Load(match e.kind() {
                std::io::ErrorKind::NotFound => IoError::FileNotFound {
                    path: path.display().to_string(),
                },
                _ => IoError::Io(e),
            })
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, value: f32| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(AlignmentError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )))
            }
        };
        positive("preprocessing.depth_limit", self.preprocessing.depth_limit)?;
        positive("preprocessing.voxel_size", self.preprocessing.voxel_size)?;
        positive("features.normal_radius", self.features.normal_radius)?;
        positive("features.feature_radius", self.features.feature_radius)?;
        self.alignment.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            "[alignment]\nmax_iterations = 50\nseed = 7\n\n[features]\nfeature_radius = 0.03\n",
        )
        .unwrap();
        assert_eq!(config.alignment.max_iterations, 50);
        assert_eq!(config.alignment.seed, Some(7));
        assert_eq!(config.alignment.min_sample_distance, 0.05);
        assert_eq!(config.features.feature_radius, 0.03);
        assert_eq!(config.features.normal_radius, 0.02);
        assert_eq!(config.preprocessing, PreprocessingConfig::default());
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(PipelineConfig::from_toml_str("").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            PipelineConfig::from_toml_str("[preprocessing]\nvoxel_size = 0.0\n"),
            Err(AlignmentError::InvalidConfig(_))
        ));
        assert!(matches!(
            PipelineConfig::from_toml_str("[alignment]\nmax_iterations = 0\n"),
            Err(AlignmentError::InvalidConfig(_))
        ));
        assert!(matches!(
            PipelineConfig::from_toml_str("[alignment\n"),
            Err(AlignmentError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_config_file() {
        let path = std::env::temp_dir().join("pointkit_missing_pipeline.toml");
        assert!(matches!(
            PipelineConfig::from_toml_file(&path),
            Err(AlignmentError::Load(IoError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_preprocessing_crops_and_downsamples() {
        let mut cloud = PointCloud::new();
        for i in 0..10 {
            // ten points inside one 5 mm voxel
            cloud.push(Point3f::new(0.0001 * i as f32, 0.0, 0.5));
        }
        cloud.push(Point3f::new(0.0, 0.0, 1.5));
        cloud.push(Point3f::new(0.0, 0.0, -0.1));
        let filtered = PreprocessingConfig::default().apply(&cloud).unwrap();
        assert_eq!(filtered.len(), 1);
        assert!((filtered[0].z - 0.5).abs() < 1e-6);
    }
}

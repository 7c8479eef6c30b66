//! A point cloud bundled with its surface normals and FPFH descriptors

use crate::error::{AlignmentError, Result};
use pointkit_algorithms::{
    compute_fpfh_features_with_index, estimate_normals_with_index, FpfhSignature,
    NormalEstimationConfig, SpatialIndex,
};
use pointkit_core::{Point3f, PointCloud, SurfaceNormal};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Search radii used when a cloud is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureCloudConfig {
    /// Radius of the neighbourhood for normal estimation
    pub normal_radius: f32,
    /// Radius of the neighbourhood for FPFH descriptors
    pub feature_radius: f32,
}

impl Default for FeatureCloudConfig {
    fn default() -> Self {
        Self {
            normal_radius: 0.02,
            feature_radius: 0.02,
        }
    }
}

/// A cloud together with the normals and local features derived from it.
///
/// Normals and descriptors are recomputed whenever the cloud is replaced, so
/// they always belong to the current cloud. Cloning shares the data.
#[derive(Debug, Clone)]
pub struct FeatureCloud {
    config: FeatureCloudConfig,
    cloud: Arc<PointCloud<Point3f>>,
    normals: Arc<Vec<SurfaceNormal>>,
    features: Arc<Vec<FpfhSignature>>,
}

impl FeatureCloud {
    /// Empty bundle; nothing is computed until a cloud is set
    pub fn new(config: FeatureCloudConfig) -> Self {
        Self {
            config,
            cloud: Arc::new(PointCloud::new()),
            normals: Arc::new(Vec::new()),
            features: Arc::new(Vec::new()),
        }
    }

    /// Build a bundle from `cloud` in one step
    pub fn from_cloud(
        cloud: impl Into<Arc<PointCloud<Point3f>>>,
        config: FeatureCloudConfig,
    ) -> Result<Self> {
        let mut feature_cloud = Self::new(config);
        feature_cloud.set_input_cloud(cloud)?;
        Ok(feature_cloud)
    }

    /// Replace the cloud and recompute normals and FPFH descriptors.
    ///
    /// On error the previous cloud, normals and descriptors are kept.
    pub fn set_input_cloud(&mut self, cloud: impl Into<Arc<PointCloud<Point3f>>>) -> Result<()> {
        let cloud = cloud.into();
        let index = SpatialIndex::new(&cloud.points);

        let normal_config = NormalEstimationConfig {
            radius: Some(self.config.normal_radius),
            consistent_orientation: true,
            ..Default::default()
        };
        let normals = estimate_normals_with_index(&cloud, &index, &normal_config)
            .map_err(AlignmentError::Features)?;
        let features = compute_fpfh_features_with_index(&cloud, &normals, &index, self.config.feature_radius)
            .map_err(AlignmentError::Features)?;

        self.cloud = cloud;
        self.normals = Arc::new(normals);
        self.features = Arc::new(features);
        Ok(())
    }

    /// Read a cloud from `path`, then behave as [`set_input_cloud`](Self::set_input_cloud)
    pub fn load_input_cloud<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let cloud = pointkit_io::read_point_cloud(path).map_err(AlignmentError::Load)?;
        self.set_input_cloud(cloud)
    }

    pub fn point_cloud(&self) -> &Arc<PointCloud<Point3f>> {
        &self.cloud
    }

    pub fn surface_normals(&self) -> &[SurfaceNormal] {
        &self.normals
    }

    pub fn local_features(&self) -> &[FpfhSignature] {
        &self.features
    }

    pub(crate) fn shared_features(&self) -> Arc<Vec<FpfhSignature>> {
        Arc::clone(&self.features)
    }

    pub fn config(&self) -> &FeatureCloudConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.cloud.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cloud.is_empty()
    }
}

impl Default for FeatureCloud {
    fn default() -> Self {
        Self::new(FeatureCloudConfig::default())
    }
}

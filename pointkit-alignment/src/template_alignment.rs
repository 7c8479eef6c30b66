//! Alignment of object templates to a target cloud
//!
//! Every template is registered onto the target with SAC-IA, using the FPFH
//! descriptors of both feature clouds to propose correspondences. The best
//! template is the one whose aligned points lie closest to the target.

use crate::error::{AlignmentError, PreconditionError, Result};
use crate::feature_cloud::FeatureCloud;
use pointkit_algorithms::{SacIaConfig, SampleConsensusInitialAlignment};
use pointkit_core::{Point3f, PointCloud, Transform3D};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Registration parameters for template alignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateAlignmentConfig {
    /// Minimum distance between sampled template points
    pub min_sample_distance: f32,
    /// Squared distance used both as the Huber threshold and the fitness cut-off
    pub max_correspondence_distance: f32,
    pub max_iterations: usize,
    /// Number of most similar target descriptors a sample may be matched to
    pub correspondence_randomness: usize,
    /// Fixed seed for reproducible registrations
    pub seed: Option<u64>,
}

impl Default for TemplateAlignmentConfig {
    fn default() -> Self {
        Self {
            min_sample_distance: 0.05,
            max_correspondence_distance: 0.01 * 0.01,
            max_iterations: 500,
            correspondence_randomness: 10,
            seed: None,
        }
    }
}

impl TemplateAlignmentConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_sample_distance.is_finite() && self.min_sample_distance > 0.0) {
            return Err(AlignmentError::InvalidConfig(format!(
                "min_sample_distance must be positive, got {}",
                self.min_sample_distance
            )));
        }
        if !(self.max_correspondence_distance.is_finite() && self.max_correspondence_distance > 0.0) {
            return Err(AlignmentError::InvalidConfig(format!(
                "max_correspondence_distance must be positive, got {}",
                self.max_correspondence_distance
            )));
        }
        if self.max_iterations == 0 {
            return Err(AlignmentError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.correspondence_randomness == 0 {
            return Err(AlignmentError::InvalidConfig(
                "correspondence_randomness must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// SAC-IA parameters with the default sample count
    pub fn sac_ia_config(&self) -> SacIaConfig {
        SacIaConfig {
            min_sample_distance: self.min_sample_distance,
            max_correspondence_distance: self.max_correspondence_distance,
            max_iterations: self.max_iterations,
            correspondence_randomness: self.correspondence_randomness,
            seed: self.seed,
            ..Default::default()
        }
    }
}

/// Outcome of aligning one template
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentResult {
    /// Mean squared distance of aligned template points to the target; lower is better
    pub fitness_score: f32,
    /// Rigid transform taking the template into the target frame
    pub final_transformation: Transform3D,
}

impl AlignmentResult {
    /// Template cloud moved into the target frame
    pub fn apply(&self, template: &FeatureCloud) -> PointCloud<Point3f> {
        template.point_cloud().transformed(&self.final_transformation)
    }
}

/// Matches a set of templates against one target cloud
pub struct TemplateAlignment {
    config: TemplateAlignmentConfig,
    target: Option<FeatureCloud>,
    templates: Vec<FeatureCloud>,
    registration: SampleConsensusInitialAlignment,
}

impl TemplateAlignment {
    pub fn new(config: TemplateAlignmentConfig) -> Result<Self> {
        config.validate()?;
        let registration = SampleConsensusInitialAlignment::new(config.sac_ia_config());
        Ok(Self {
            config,
            target: None,
            templates: Vec::new(),
            registration,
        })
    }

    pub fn config(&self) -> &TemplateAlignmentConfig {
        &self.config
    }

    /// Set the cloud templates are aligned to; replaces any previous target
    pub fn set_target_cloud(&mut self, target: FeatureCloud) {
        configure_target(&mut self.registration, &target);
        self.target = Some(target);
    }

    pub fn target(&self) -> Option<&FeatureCloud> {
        self.target.as_ref()
    }

    pub fn add_template_cloud(&mut self, template: FeatureCloud) {
        self.templates.push(template);
    }

    pub fn templates(&self) -> &[FeatureCloud] {
        &self.templates
    }

    /// Align a single template to the target
    pub fn align(&mut self, template: &FeatureCloud) -> Result<AlignmentResult> {
        self.require_target()?;
        run_registration(&mut self.registration, template, self.config.max_correspondence_distance)
            .map_err(AlignmentError::Registration)
    }

    /// Align every template in insertion order; the first failure aborts the batch
    pub fn align_all(&mut self) -> Result<Vec<AlignmentResult>> {
        self.require_target()?;
        align_sequential(
            &mut self.registration,
            &self.templates,
            self.config.max_correspondence_distance,
        )
    }

    /// Same results as [`align_all`](Self::align_all), computed on the rayon pool
    pub fn align_all_parallel(&self) -> Result<Vec<AlignmentResult>> {
        self.require_target()?;
        align_parallel(
            &self.registration,
            &self.templates,
            self.config.max_correspondence_distance,
        )
    }

    /// Index and result of the template with the lowest fitness score
    pub fn find_best_alignment(&mut self) -> Result<(usize, AlignmentResult)> {
        select_best(&self.align_all()?)
    }

    fn require_target(&self) -> Result<()> {
        match self.target {
            Some(_) => Ok(()),
            None => Err(PreconditionError::TargetNotSet.into()),
        }
    }
}

fn configure_target(registration: &mut SampleConsensusInitialAlignment, target: &FeatureCloud) {
    registration.set_input_target(Arc::clone(target.point_cloud()), target.shared_features());
}

fn run_registration(
    registration: &mut SampleConsensusInitialAlignment,
    template: &FeatureCloud,
    max_correspondence_distance: f32,
) -> pointkit_core::Result<AlignmentResult> {
    registration.set_input_source(Arc::clone(template.point_cloud()), template.shared_features());
    registration.align()?;
    Ok(AlignmentResult {
        fitness_score: registration.fitness_score(max_correspondence_distance)?,
        final_transformation: registration.final_transformation(),
    })
}

fn align_sequential(
    registration: &mut SampleConsensusInitialAlignment,
    templates: &[FeatureCloud],
    max_correspondence_distance: f32,
) -> Result<Vec<AlignmentResult>> {
    templates
        .iter()
        .enumerate()
        .map(|(index, template)| {
            run_registration(registration, template, max_correspondence_distance)
                .map_err(|source| AlignmentError::Alignment { index, source })
        })
        .collect()
}

fn align_parallel(
    registration: &SampleConsensusInitialAlignment,
    templates: &[FeatureCloud],
    max_correspondence_distance: f32,
) -> Result<Vec<AlignmentResult>> {
    let outcomes: Vec<pointkit_core::Result<AlignmentResult>> = templates
        .par_iter()
        .map(|template| {
            let mut registration = registration.clone();
            run_registration(&mut registration, template, max_correspondence_distance)
        })
        .collect();

    // report the lowest failing index, as the sequential path does
    outcomes
        .into_iter()
        .enumerate()
        .map(|(index, outcome)| outcome.map_err(|source| AlignmentError::Alignment { index, source }))
        .collect()
}

/// Align every template to `target` in order
pub fn align_templates(
    target: &FeatureCloud,
    templates: &[FeatureCloud],
    config: &TemplateAlignmentConfig,
) -> Result<Vec<AlignmentResult>> {
    config.validate()?;
    let mut registration = SampleConsensusInitialAlignment::new(config.sac_ia_config());
    configure_target(&mut registration, target);
    align_sequential(&mut registration, templates, config.max_correspondence_distance)
}

/// Parallel form of [`align_templates`]; results keep template order
pub fn align_templates_parallel(
    target: &FeatureCloud,
    templates: &[FeatureCloud],
    config: &TemplateAlignmentConfig,
) -> Result<Vec<AlignmentResult>> {
    config.validate()?;
    let mut registration = SampleConsensusInitialAlignment::new(config.sac_ia_config());
    configure_target(&mut registration, target);
    align_parallel(&registration, templates, config.max_correspondence_distance)
}

/// Lowest fitness score; on exact ties the earliest result wins
pub fn select_best(results: &[AlignmentResult]) -> Result<(usize, AlignmentResult)> {
    let mut best: Option<(usize, AlignmentResult)> = None;
    for (index, result) in results.iter().enumerate() {
        match best {
            Some((_, b)) if result.fitness_score >= b.fitness_score => {}
            _ => best = Some((index, *result)),
        }
    }
    best.ok_or_else(|| PreconditionError::EmptyTemplateSet.into())
}

/// Write `template` moved by `result` to a PCD file
pub fn save_aligned_template<P: AsRef<Path>>(
    template: &FeatureCloud,
    result: &AlignmentResult,
    path: P,
) -> Result<()> {
    pointkit_io::write_point_cloud(&result.apply(template), path).map_err(AlignmentError::Save)
}

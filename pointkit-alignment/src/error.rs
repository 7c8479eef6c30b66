//! Error types for feature clouds and template alignment

use pointkit_io::IoError;
use thiserror::Error;

/// An operation was called before the state it needs was set up
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("no target cloud has been set")]
    TargetNotSet,

    #[error("no template clouds have been added")]
    EmptyTemplateSet,
}

/// Errors that can occur while preparing clouds or aligning templates
#[derive(Error, Debug)]
pub enum AlignmentError {
    #[error("Failed to load point cloud: {0}")]
    Load(#[source] IoError),

    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("Alignment of template {index} failed: {source}")]
    Alignment {
        index: usize,
        #[source]
        source: pointkit_core::Error,
    },

    #[error("Registration failed: {0}")]
    Registration(#[source] pointkit_core::Error),

    #[error("Failed to save point cloud: {0}")]
    Save(#[source] IoError),

    #[error("Feature computation failed: {0}")]
    Features(#[source] pointkit_core::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for alignment operations
pub type Result<T> = std::result::Result<T, AlignmentError>;

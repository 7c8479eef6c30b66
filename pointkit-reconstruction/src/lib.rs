//! # pointkit Reconstruction
//!
//! Surface reconstruction for 3D point clouds.
//!
//! This crate provides moving least squares smoothing, which resamples a noisy
//! cloud onto locally fitted polynomial surfaces and derives normals from them.

pub mod moving_least_squares;

// Re-export commonly used items
pub use moving_least_squares::*;

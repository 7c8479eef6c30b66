//! # pointkit Algorithms
//!
//! Point cloud algorithms built on the `pointkit-core` types.
//!
//! This crate provides neighbour search, normal estimation, FPFH descriptors,
//! filtering, SAC-IA registration, and range images with keypoint and border
//! extraction.

pub mod features;
pub mod filtering;
pub mod keypoints;
pub mod nearest_neighbor;
pub mod normals;
pub mod range_image;
pub mod registration;

// Re-export commonly used items
pub use features::*;
pub use filtering::*;
pub use keypoints::*;
pub use nearest_neighbor::*;
pub use normals::*;
pub use range_image::*;
pub use registration::*;

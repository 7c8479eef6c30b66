//! Core data structures and traits for pointkit
//!
//! This crate provides the fundamental types shared by every other pointkit
//! crate: points with optional colour and normal attributes, the generic
//! point cloud container, rigid transforms and the neighbour search trait.

pub mod point;
pub mod point_cloud;
pub mod traits;
pub mod transform;
pub mod error;

pub use point::*;
pub use point_cloud::*;
pub use traits::*;
pub use transform::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix3, Matrix4, Isometry3, UnitQuaternion};

pub type Point = Point3f;

//! Core traits for pointkit

use crate::point::*;

/// Trait for nearest neighbor search functionality.
///
/// Distances returned by both methods are Euclidean (not squared) and the
/// results are sorted by increasing distance.
pub trait NearestNeighborSearch {
    /// Find the k nearest neighbors to a query point
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)>;

    /// Find all neighbors within a given radius
    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)>;
}

/// Point types that carry a 3D position
pub trait HasPosition {
    fn position(&self) -> Point3f;
}

impl HasPosition for Point3f {
    fn position(&self) -> Point3f {
        *self
    }
}

impl HasPosition for ColoredPoint3f {
    fn position(&self) -> Point3f {
        self.position
    }
}

impl HasPosition for NormalPoint3f {
    fn position(&self) -> Point3f {
        self.position
    }
}

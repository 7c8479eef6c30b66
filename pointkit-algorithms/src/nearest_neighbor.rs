//! Nearest neighbor search implementations

use pointkit_core::{NearestNeighborSearch, Point3f};
use rstar::primitives::GeomWithData;
use rstar::RTree;

type IndexedPoint = GeomWithData<[f32; 3], usize>;

/// R*-tree backed spatial index over a fixed set of points.
///
/// Indices returned by the queries refer to positions in the slice the index
/// was built from.
pub struct SpatialIndex {
    tree: RTree<IndexedPoint>,
}

impl SpatialIndex {
    pub fn new(points: &[Point3f]) -> Self {
        let entries: Vec<IndexedPoint> = points
            .iter()
            .enumerate()
            .map(|(idx, p)| GeomWithData::new([p.x, p.y, p.z], idx))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Closest indexed point and its squared distance
    pub fn nearest_squared(&self, query: &Point3f) -> Option<(usize, f32)> {
        self.tree
            .nearest_neighbor_iter_with_distance_2(&[query.x, query.y, query.z])
            .next()
            .map(|(entry, dist_sq)| (entry.data, dist_sq))
    }

    /// All points within `radius`, sorted by squared distance (ties by index)
    pub fn radius_squared(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        let q = [query.x, query.y, query.z];
        let mut found: Vec<(usize, f32)> = self
            .tree
            .locate_within_distance(q, radius * radius)
            .map(|entry| {
                let p = entry.geom();
                let dx = p[0] - q[0];
                let dy = p[1] - q[1];
                let dz = p[2] - q[2];
                (entry.data, dx * dx + dy * dy + dz * dz)
            })
            .collect();
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        found
    }

    /// The `k` closest points with squared distances, closest first
    pub fn k_nearest_squared(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        self.tree
            .nearest_neighbor_iter_with_distance_2(&[query.x, query.y, query.z])
            .take(k)
            .map(|(entry, dist_sq)| (entry.data, dist_sq))
            .collect()
    }
}

impl NearestNeighborSearch for SpatialIndex {
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        self.k_nearest_squared(query, k)
            .into_iter()
            .map(|(idx, dist_sq)| (idx, dist_sq.sqrt()))
            .collect()
    }

    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        if radius <= 0.0 {
            return Vec::new();
        }
        self.radius_squared(query, radius)
            .into_iter()
            .map(|(idx, dist_sq)| (idx, dist_sq.sqrt()))
            .collect()
    }
}

/// Simple brute force nearest neighbor search for small datasets
pub struct BruteForceSearch {
    points: Vec<Point3f>,
}

impl BruteForceSearch {
    pub fn new(points: &[Point3f]) -> Self {
        Self {
            points: points.to_vec(),
        }
    }

    fn sorted_distances(&self, query: &Point3f) -> Vec<(usize, f32)> {
        let mut distances: Vec<(usize, f32)> = self
            .points
            .iter()
            .enumerate()
            .map(|(idx, point)| (idx, (point - query).magnitude()))
            .collect();
        distances.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        distances
    }
}

impl NearestNeighborSearch for BruteForceSearch {
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        let mut distances = self.sorted_distances(query);
        distances.truncate(k);
        distances
    }

    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        self.sorted_distances(query)
            .into_iter()
            .take_while(|&(_, distance)| distance <= radius)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    fn random_points(n: usize, seed: u64) -> Vec<Point3f> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| Point3f::new(rng.gen(), rng.gen(), rng.gen()))
            .collect()
    }

    #[test]
    fn test_spatial_index_matches_brute_force() {
        let points = random_points(300, 7);
        let index = SpatialIndex::new(&points);
        let brute = BruteForceSearch::new(&points);
        let query = Point3f::new(0.4, 0.5, 0.6);

        let fast: Vec<usize> = index.find_k_nearest(&query, 8).into_iter().map(|(i, _)| i).collect();
        let slow: Vec<usize> = brute.find_k_nearest(&query, 8).into_iter().map(|(i, _)| i).collect();
        assert_eq!(fast, slow);

        let fast: Vec<usize> = index.find_radius_neighbors(&query, 0.2).into_iter().map(|(i, _)| i).collect();
        let slow: Vec<usize> = brute.find_radius_neighbors(&query, 0.2).into_iter().map(|(i, _)| i).collect();
        assert_eq!(fast, slow);
    }

    #[test]
    fn test_radius_includes_query_point_itself() {
        let points = vec![Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 0.0, 0.0)];
        let index = SpatialIndex::new(&points);
        let neighbors = index.radius_squared(&points[0], 0.5);
        assert_eq!(neighbors, vec![(0, 0.0)]);
    }

    #[test]
    fn test_nearest_on_empty_index() {
        let index = SpatialIndex::new(&[]);
        assert!(index.is_empty());
        assert!(index.nearest_squared(&Point3f::origin()).is_none());
    }

    #[test]
    fn test_duplicate_points_are_all_returned() {
        let points = vec![Point3f::new(0.5, 0.5, 0.0); 40];
        let index = SpatialIndex::new(&points);
        assert_eq!(index.len(), 40);
        assert_eq!(index.radius_squared(&Point3f::new(0.5, 0.5, 0.0), 0.01).len(), 40);
    }
}

//! Planar nearest-neighbour index over station coordinates, backed by an `rstar` R-tree.

use crate::types::station::StationRecord;
use ordered_float::OrderedFloat;
use rstar::primitives::GeomWithData;
use rstar::RTree;

/// A station coordinate tagged with its position in the registry.
type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// One query result: a registry position and its squared planar distance (in degrees²)
/// to the query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance_2: f64,
}

impl Neighbor {
    /// Planar distance in degrees.
    pub fn distance(&self) -> f64 {
        self.distance_2.sqrt()
    }
}

/// Read-only spatial index built once from the registry's station sequence.
///
/// The index stores registry positions, never station data, so results are only meaningful
/// against the exact slice the index was built from.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    rtree: RTree<IndexedPoint>,
    len: usize,
}

impl SpatialIndex {
    pub fn build(stations: &[StationRecord]) -> Self {
        let points: Vec<IndexedPoint> = stations
            .iter()
            .enumerate()
            .map(|(position, s)| GeomWithData::new([s.latitude, s.longitude], position))
            .collect();
        SpatialIndex {
            len: points.len(),
            rtree: RTree::bulk_load(points),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the `k` positions closest to `(latitude, longitude)` by planar distance,
    /// nearest first. Equal distances are ordered by registry position.
    ///
    /// Callers are expected to keep `k` within [`SpatialIndex::len`]; a larger `k` yields
    /// every indexed position.
    pub fn nearest(&self, latitude: f64, longitude: f64, k: usize) -> Vec<Neighbor> {
        if k == 0 {
            return vec![];
        }
        let query_point = [latitude, longitude];
        let mut hits: Vec<Neighbor> = Vec::with_capacity(k.min(self.len));

        // The R-tree yields points by ascending distance. Keep going past `k` while the
        // distance ties with the k-th hit, so the tie-break below sees every candidate.
        for (point, distance_2) in self.rtree.nearest_neighbor_iter_with_distance_2(&query_point) {
            if hits.len() >= k && hits.last().is_some_and(|last| distance_2 > last.distance_2) {
                break;
            }
            hits.push(Neighbor {
                position: point.data,
                distance_2,
            });
        }

        hits.sort_by_key(|n| (OrderedFloat(n.distance_2), n.position));
        hits.truncate(k);
        hits
    }
}

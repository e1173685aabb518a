//! Exact flat nearest-neighbour index over fixed-dimension vectors.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// L2 distance.
    #[default]
    Euclidean,
    /// Squared L2 distance, as reported by flat-L2 indices.
    SquaredEuclidean,
}

impl DistanceMetric {
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        let squared: f32 = a
            .iter()
            .zip(b)
            .map(|(x, y)| {
                let d = x - y;
                d * d
            })
            .sum();
        match self {
            Self::Euclidean => squared.sqrt(),
            Self::SquaredEuclidean => squared,
        }
    }
}

/// Map a non-negative distance into (0, 1]; distance 0 gives 1.
#[must_use]
pub fn similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// Vectors stored contiguously; position `i` is the `i`-th vector ever added
/// since the last reset.
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    dimension: usize,
    metric: DistanceMetric,
    data: Vec<f32>,
}

impl EmbeddingIndex {
    #[must_use]
    pub fn new(dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            metric,
            data: Vec::new(),
        }
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    #[must_use]
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append vectors, returning the positions they were assigned.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if any vector has the wrong dimension; nothing is appended then.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Range<usize>> {
        self.check_dimensions(vectors)?;
        let start = self.len();
        self.data.reserve(vectors.len() * self.dimension);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(start..self.len())
    }

    /// Validate dimensions without mutating.
    ///
    /// # Errors
    ///
    /// Returns `Validation` naming the first offending vector.
    pub fn check_dimensions(&self, vectors: &[Vec<f32>]) -> Result<()> {
        if self.dimension == 0 {
            return Err(IndexError::Validation(
                "embedding dimension must be positive".into(),
            ));
        }
        if let Some((i, v)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != self.dimension)
        {
            return Err(IndexError::Validation(format!(
                "embedding {i} has dimension {}, expected {}",
                v.len(),
                self.dimension
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// The `k` nearest vectors, closest first. Equal distances keep position order.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the query has the wrong dimension.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(IndexError::Validation(format!(
                "query has dimension {}, expected {}",
                query.len(),
                self.dimension
            )));
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, v)| Neighbor {
                position,
                distance: self.metric.distance(query, v),
            })
            .collect();
        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        neighbors.truncate(k);
        Ok(neighbors)
    }

    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Little-endian f32 blob in position order.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.iter().flat_map(|x| x.to_le_bytes()).collect()
    }

    /// Rebuild from [`EmbeddingIndex::to_bytes`] output.
    ///
    /// # Errors
    ///
    /// Returns `Consistency` if the blob is not a whole number of vectors.
    pub fn from_bytes(dimension: usize, metric: DistanceMetric, bytes: &[u8]) -> Result<Self> {
        let stride = dimension * 4;
        if dimension == 0 || bytes.len() % stride != 0 {
            return Err(IndexError::Consistency(format!(
                "vector blob of {} bytes does not hold {dimension}-dimensional vectors",
                bytes.len()
            )));
        }
        let data = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(Self {
            dimension,
            metric,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn index_with(vectors: &[[f32; 2]]) -> EmbeddingIndex {
        let mut index = EmbeddingIndex::new(2, DistanceMetric::Euclidean);
        let owned: Vec<Vec<f32>> = vectors.iter().map(|v| v.to_vec()).collect();
        index.add(&owned).unwrap();
        index
    }

    #[test]
    fn positions_follow_insertion_order() {
        let mut index = EmbeddingIndex::new(2, DistanceMetric::Euclidean);
        assert_eq!(index.add(&[vec![0.0, 0.0], vec![1.0, 1.0]]).unwrap(), 0..2);
        assert_eq!(index.add(&[vec![2.0, 2.0]]).unwrap(), 2..3);
        assert_eq!(index.vector(2), Some(&[2.0, 2.0][..]));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn wrong_dimension_appends_nothing() {
        let mut index = index_with(&[[0.0, 0.0]]);
        let err = index.add(&[vec![1.0, 1.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, IndexError::Validation(_)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn search_orders_by_distance() {
        let index = index_with(&[[10.0, 0.0], [1.0, 0.0], [3.0, 4.0]]);
        let hits = index.search(&[0.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].position, 1);
        assert!((hits[0].distance - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].position, 2);
        assert!((hits[1].distance - 5.0).abs() < 1e-6);
    }

    #[test]
    fn squared_metric_skips_root() {
        let d = DistanceMetric::SquaredEuclidean.distance(&[0.0, 0.0], &[3.0, 4.0]);
        assert!((d - 25.0).abs() < 1e-6);
    }

    #[test]
    fn ties_keep_position_order() {
        let index = index_with(&[[1.0, 0.0], [0.0, 1.0], [-1.0, 0.0]]);
        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn k_larger_than_index_returns_all() {
        let index = index_with(&[[1.0, 0.0], [0.0, 1.0]]);
        assert_eq!(index.search(&[0.0, 0.0], 10).unwrap().len(), 2);
    }

    #[test]
    fn empty_index_and_zero_k_return_nothing() {
        let empty = EmbeddingIndex::new(2, DistanceMetric::Euclidean);
        assert!(empty.search(&[0.0, 0.0], 5).unwrap().is_empty());
        let index = index_with(&[[1.0, 0.0]]);
        assert!(index.search(&[0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn query_dimension_is_checked() {
        let index = index_with(&[[1.0, 0.0]]);
        assert!(index.search(&[0.0], 1).is_err());
    }

    #[test]
    fn similarity_maps_zero_to_one() {
        assert!((similarity(0.0) - 1.0).abs() < f32::EPSILON);
        assert!((similarity(1.0) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn reset_clears_vectors() {
        let mut index = index_with(&[[1.0, 0.0]]);
        index.reset();
        assert!(index.is_empty());
        assert_eq!(index.add(&[vec![0.0, 0.0]]).unwrap(), 0..1);
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let bytes = index_with(&[[1.0, 2.0]]).to_bytes();
        assert!(EmbeddingIndex::from_bytes(2, DistanceMetric::Euclidean, &bytes[..6]).is_err());
    }

    proptest! {
        #[test]
        fn blob_round_trips(values in prop::collection::vec(-1.0e6f32..1.0e6, 0..64)) {
            let dimension = 4;
            let whole = values.len() / dimension * dimension;
            let vectors: Vec<Vec<f32>> = values[..whole]
                .chunks(dimension)
                .map(<[f32]>::to_vec)
                .collect();
            let mut index = EmbeddingIndex::new(dimension, DistanceMetric::Euclidean);
            index.add(&vectors).unwrap();
            let restored =
                EmbeddingIndex::from_bytes(dimension, DistanceMetric::Euclidean, &index.to_bytes())
                    .unwrap();
            prop_assert_eq!(restored.len(), vectors.len());
            for (i, v) in vectors.iter().enumerate() {
                prop_assert_eq!(restored.vector(i), Some(v.as_slice()));
            }
        }

        #[test]
        fn similarity_is_in_unit_interval(d in 0.0f32..1.0e9) {
            let s = similarity(d);
            prop_assert!(s > 0.0 && s <= 1.0);
        }
    }
}

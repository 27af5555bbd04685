//! Exact brute-force index over a row-major vector matrix

use super::IndexError;
use ndarray::{Array2, ArrayView1, Axis};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A stored vector matched by a search: its position and squared L2 distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// Flat (exhaustive) index: `n × d` matrix, row `p` is the vector at position `p`
///
/// Immutable once constructed; build a new one to change its contents.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    vectors: Array2<f32>,
}

impl FlatIndex {
    /// Create an empty index of the given dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: Array2::zeros((0, dimension)),
        }
    }

    /// Create an index from concatenated rows of length `dimension`
    pub fn from_flat(dimension: usize, data: Vec<f32>) -> Result<Self, IndexError> {
        if dimension == 0 {
            if !data.is_empty() {
                return Err(IndexError::InvalidArgument(
                    "vectors of dimension 0 cannot hold data".to_string(),
                ));
            }
            return Ok(Self::new(0));
        }

        if data.len() % dimension != 0 {
            return Err(IndexError::InvalidArgument(format!(
                "{} values do not divide into rows of dimension {}",
                data.len(),
                dimension
            )));
        }

        let rows = data.len() / dimension;
        let vectors = Array2::from_shape_vec((rows, dimension), data)
            .map_err(|e| IndexError::InvalidArgument(e.to_string()))?;

        Ok(Self { vectors })
    }

    /// Create an index from individual rows, checking each row's dimension
    pub fn from_rows(dimension: usize, rows: &[Vec<f32>]) -> Result<Self, IndexError> {
        let mut data = Vec::with_capacity(rows.len() * dimension);
        for row in rows {
            if row.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Self::from_flat(dimension, data)
    }

    /// Number of stored vectors
    pub fn ntotal(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.ntotal() == 0
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    /// Vector stored at `position`
    pub fn row(&self, position: usize) -> Option<ArrayView1<'_, f32>> {
        (position < self.ntotal()).then(|| self.vectors.row(position))
    }

    /// All values in row-major order
    pub fn values(&self) -> impl Iterator<Item = &f32> + '_ {
        self.vectors.iter()
    }

    /// Return the `k` stored vectors closest to `query`, nearest first.
    ///
    /// Every row is compared (`O(n·d)`); selection keeps a max-heap of the best
    /// `k` seen so far (`O(n log k)`). Equal distances are ordered by ascending
    /// position. `k > n` yields `n` neighbors; an empty index yields none.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }

        if k == 0 {
            return Err(IndexError::InvalidArgument(
                "k must be at least 1".to_string(),
            ));
        }

        let k = k.min(self.ntotal());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k);
        for (position, row) in self.vectors.axis_iter(Axis(0)).enumerate() {
            let candidate = Candidate {
                distance: squared_l2(row, query),
                position,
            };

            if heap.len() < k {
                heap.push(candidate);
            } else if let Some(mut worst) = heap.peek_mut() {
                if candidate < *worst {
                    *worst = candidate;
                }
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| Neighbor {
                position: c.position,
                distance: c.distance,
            })
            .collect())
    }
}

/// Squared Euclidean distance, summed in dimension order
pub fn squared_l2(row: ArrayView1<'_, f32>, query: &[f32]) -> f32 {
    row.iter().zip(query).fold(0.0f32, |acc, (a, b)| {
        let diff = a - b;
        acc + diff * diff
    })
}

/// Heap entry ordered by (distance, position)
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    position: usize,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.position.cmp(&other.position))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

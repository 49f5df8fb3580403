//! Median partitioning of particle ensembles
//!
//! Splits a point set into balanced blocks by recursively halving the
//! indices at the median of the widest-spread dimension. The smoother
//! recomputes the partition at every time step and uses the blocks to
//! bound pairwise kernel evaluation: distant blocks are summarized by
//! their centroid instead of member-by-member sums.

use ::core::cmp::Ordering;
use nalgebra::RealField;
use num_traits::Float;

use crate::types::spaces::DynVector;
use crate::{Result, SmcError};

/// One block of a median partition.
#[derive(Debug, Clone)]
pub struct PartitionBlock<T: RealField, const ND: usize> {
    /// Member indices into the partitioned point set.
    pub indices: Vec<usize>,
    /// Centroid of the member points.
    pub centroid: DynVector<T, ND>,
    /// Largest member distance from the centroid.
    pub radius: T,
}

/// Balanced median-split partitioner.
#[derive(Debug, Clone, Copy)]
pub struct MedianPartitioner {
    max_block: usize,
}

impl Default for MedianPartitioner {
    fn default() -> Self {
        Self { max_block: 32 }
    }
}

impl MedianPartitioner {
    /// Creates a partitioner producing blocks of at most `max_block`
    /// points.
    ///
    /// # Errors
    /// Returns [`SmcError::InvalidConfig`] when `max_block` is zero.
    pub fn new(max_block: usize) -> Result<Self> {
        if max_block == 0 {
            return Err(SmcError::InvalidConfig("partition block size must be positive"));
        }
        Ok(Self { max_block })
    }

    /// Largest block size this partitioner produces.
    #[inline]
    pub fn max_block(&self) -> usize {
        self.max_block
    }

    /// Partitions `points` into balanced blocks with centroid and radius
    /// summaries.
    pub fn partition<T: RealField + Float + Copy, const ND: usize>(
        &self,
        points: &[DynVector<T, ND>],
    ) -> Vec<PartitionBlock<T, ND>> {
        let mut blocks = Vec::new();
        if points.is_empty() {
            return blocks;
        }
        let indices: Vec<usize> = (0..points.len()).collect();
        split_recursive(points, indices, self.max_block, &mut blocks);
        blocks
    }
}

fn split_recursive<T: RealField + Float + Copy, const ND: usize>(
    points: &[DynVector<T, ND>],
    mut indices: Vec<usize>,
    max_block: usize,
    blocks: &mut Vec<PartitionBlock<T, ND>>,
) {
    if indices.len() <= max_block {
        blocks.push(summarize(points, indices));
        return;
    }

    // Split on the dimension with the largest spread over this block.
    let mut split_dim = 0usize;
    let mut best_spread = T::neg_infinity();
    for dim in 0..ND {
        let mut lo = T::infinity();
        let mut hi = T::neg_infinity();
        for &i in &indices {
            let v = *points[i].index(dim);
            if v < lo {
                lo = v;
            }
            if v > hi {
                hi = v;
            }
        }
        let spread = hi - lo;
        if spread > best_spread {
            best_spread = spread;
            split_dim = dim;
        }
    }

    // Coincident points have no useful split; keep them as one block.
    if !(best_spread > T::zero()) {
        blocks.push(summarize(points, indices));
        return;
    }

    let mid = indices.len() / 2;
    indices.select_nth_unstable_by(mid, |&a, &b| {
        points[a]
            .index(split_dim)
            .partial_cmp(points[b].index(split_dim))
            .unwrap_or(Ordering::Equal)
    });
    let upper = indices.split_off(mid);
    split_recursive(points, indices, max_block, blocks);
    split_recursive(points, upper, max_block, blocks);
}

fn summarize<T: RealField + Float + Copy, const ND: usize>(
    points: &[DynVector<T, ND>],
    indices: Vec<usize>,
) -> PartitionBlock<T, ND> {
    let n = T::from(indices.len()).unwrap();
    let mut centroid = DynVector::<T, ND>::zeros();
    for &i in &indices {
        centroid = centroid + points[i];
    }
    centroid = centroid.scale(T::one() / n);

    let mut radius = T::zero();
    for &i in &indices {
        let d = Float::sqrt(points[i].distance_squared(&centroid));
        if d > radius {
            radius = d;
        }
    }
    PartitionBlock {
        indices,
        centroid,
        radius,
    }
}

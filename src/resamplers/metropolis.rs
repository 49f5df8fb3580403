//! Metropolis exchange resampling
//!
//! Approximate O(P·B) scheme: each output slot starts at its own particle
//! and takes `B` Metropolis exchange proposals, accepting a uniformly
//! drawn competitor `j` over the incumbent `k` with probability
//! `min(1, w_j / w_k)`. No cumulative sums, no sorting, no global
//! normalization; the chain targets the normalized weight distribution,
//! so the plan is unbiased in the limit of many iterations. Built for the
//! accelerator path, where avoiding the prefix-sum barrier matters more
//! than exactness.

use nalgebra::RealField;
use num_traits::Float;

use crate::random::RandomSource;
use crate::resamplers::{validate_weights, Resampler};
use crate::Result;

/// Approximate Metropolis exchange resampler.
#[derive(Debug, Clone, Copy)]
pub struct MetropolisResampler {
    iterations: Option<usize>,
}

impl MetropolisResampler {
    /// Creates a resampler taking `iterations` exchange proposals per slot.
    pub fn new(iterations: usize) -> Self {
        Self {
            iterations: Some(iterations.max(1)),
        }
    }

    /// Proposals per slot for an ensemble of `count` particles:
    /// the configured count, or `ceil(log2 P) + 4` by default.
    fn iterations_for(&self, count: usize) -> usize {
        self.iterations
            .unwrap_or_else(|| (usize::BITS - count.leading_zeros()) as usize + 4)
    }
}

impl Default for MetropolisResampler {
    fn default() -> Self {
        Self { iterations: None }
    }
}

impl<T: RealField + Float + Copy> Resampler<T> for MetropolisResampler {
    fn resample(&self, rng: &mut RandomSource, weights: &[T]) -> Result<Vec<usize>> {
        validate_weights(weights)?;
        let count = weights.len();
        let iterations = self.iterations_for(count);

        let mut plan = Vec::with_capacity(count);
        for i in 0..count {
            let mut k = i;
            for _ in 0..iterations {
                let j = rng.uniform_index(count);
                let u = rng.uniform::<T>();
                // A zero-weight incumbent loses every contest.
                if weights[k] <= T::zero() || u * weights[k] <= weights[j] {
                    k = j;
                }
            }
            plan.push(k);
        }
        Ok(plan)
    }
}

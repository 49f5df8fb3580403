//! Multinomial resampling
//!
//! `P` independent draws from the categorical distribution defined by the
//! normalized weights. Higher variance than stratified selection; kept as
//! the baseline the lower-variance schemes are measured against.

use nalgebra::RealField;
use num_traits::Float;

use crate::random::RandomSource;
use crate::resamplers::{validate_weights, Resampler};
use crate::Result;

/// Baseline multinomial resampler.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultinomialResampler;

impl<T: RealField + Float + Copy> Resampler<T> for MultinomialResampler {
    fn resample(&self, rng: &mut RandomSource, weights: &[T]) -> Result<Vec<usize>> {
        validate_weights(weights)?;
        let count = weights.len();

        let mut cumulative = Vec::with_capacity(count);
        let mut sum = T::zero();
        for &w in weights {
            sum = sum + w;
            cumulative.push(sum);
        }
        let total = cumulative[count - 1];

        let mut plan = Vec::with_capacity(count);
        for _ in 0..count {
            let u = rng.uniform::<T>() * total;
            let j = cumulative.partition_point(|&c| c <= u).min(count - 1);
            plan.push(j);
        }
        Ok(plan)
    }
}

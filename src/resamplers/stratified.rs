//! Stratified resampling
//!
//! Partitions the cumulative-weight interval into `P` equal strata and
//! draws one offset per stratum, giving ordered, low-variance selection.
//! Two implementations share the scheme: the fast path resolves all
//! strata in a single running-sum scan, the exact path locates every
//! stratum draw by binary search over a compensated cumulative array and
//! exists to validate the scan on badly conditioned weight vectors.

use nalgebra::RealField;
use num_traits::Float;

use crate::random::RandomSource;
use crate::resamplers::{validate_weights, Resampler};
use crate::Result;

/// Fast stratified resampler (the default strategy).
#[derive(Debug, Clone, Copy, Default)]
pub struct StratifiedResampler;

impl<T: RealField + Float + Copy> Resampler<T> for StratifiedResampler {
    fn resample(&self, rng: &mut RandomSource, weights: &[T]) -> Result<Vec<usize>> {
        let sum = validate_weights(weights)?;
        let count = weights.len();
        let stratum = sum / T::from(count).unwrap();

        // Stratum draws are strictly increasing, so one forward scan over
        // the running weight sum resolves every stratum in O(P).
        let mut plan = Vec::with_capacity(count);
        let mut cumulative = weights[0];
        let mut j = 0usize;
        for i in 0..count {
            let offset: T = rng.uniform();
            let u = (T::from(i).unwrap() + offset) * stratum;
            while u >= cumulative && j + 1 < count {
                j += 1;
                cumulative = cumulative + weights[j];
            }
            plan.push(j);
        }
        Ok(plan)
    }
}

/// Stratified resampler with exact per-stratum search.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactStratifiedResampler;

impl<T: RealField + Float + Copy> Resampler<T> for ExactStratifiedResampler {
    fn resample(&self, rng: &mut RandomSource, weights: &[T]) -> Result<Vec<usize>> {
        validate_weights(weights)?;
        let count = weights.len();

        // Kahan-compensated cumulative sum; the final entry, not the naive
        // sum, defines the stratum width so the last stratum cannot
        // overrun the array.
        let mut cumulative = Vec::with_capacity(count);
        let mut sum = T::zero();
        let mut carry = T::zero();
        for &w in weights {
            let y = w - carry;
            let t = sum + y;
            carry = (t - sum) - y;
            sum = t;
            cumulative.push(sum);
        }
        let total = cumulative[count - 1];
        let stratum = total / T::from(count).unwrap();

        let mut plan = Vec::with_capacity(count);
        for i in 0..count {
            let offset: T = rng.uniform();
            let u = (T::from(i).unwrap() + offset) * stratum;
            let j = cumulative.partition_point(|&c| c <= u).min(count - 1);
            plan.push(j);
        }
        Ok(plan)
    }
}

//! Numeric and timing utilities shared across the inference engine
//!
//! Stable log-domain reductions, effective-sample-size computation,
//! weighted moments and a small stopwatch for the optional timing output.

use nalgebra::RealField;
use num_traits::Float;

use std::time::Instant;

/// Computes `log(sum(exp(x_i)))` with the usual max-shift for stability.
///
/// Returns negative infinity for an empty slice or when every entry is
/// negative infinity.
pub fn log_sum_exp<T: RealField + Float + Copy>(values: &[T]) -> T {
    let mut max = T::neg_infinity();
    for &v in values {
        if v > max {
            max = v;
        }
    }
    if !Float::is_finite(max) {
        return T::neg_infinity();
    }
    let mut sum = T::zero();
    for &v in values {
        sum = sum + Float::exp(v - max);
    }
    max + Float::ln(sum)
}

/// Effective sample size of an unnormalized weight vector.
///
/// `ESS = (sum w)^2 / sum(w^2)`, in `[1, P]` for a valid weight vector.
/// Returns zero when the weights sum to zero or contain non-finite values,
/// so callers can treat `ess == 0` as the degeneracy signal.
pub fn effective_sample_size<T: RealField + Float + Copy>(weights: &[T]) -> T {
    let mut sum = T::zero();
    let mut sum_sq = T::zero();
    for &w in weights {
        if !Float::is_finite(w) || w < T::zero() {
            return T::zero();
        }
        sum = sum + w;
        sum_sq = sum_sq + w * w;
    }
    if sum_sq <= T::zero() || !Float::is_finite(sum) {
        return T::zero();
    }
    sum * sum / sum_sq
}

/// Weighted mean of scalar samples. Weights need not be normalized.
///
/// Returns `None` when the weights sum to zero.
pub fn weighted_mean<T: RealField + Float + Copy>(values: &[T], weights: &[T]) -> Option<T> {
    debug_assert_eq!(values.len(), weights.len());
    let mut sum_w = T::zero();
    let mut sum_wx = T::zero();
    for (&x, &w) in values.iter().zip(weights) {
        sum_w = sum_w + w;
        sum_wx = sum_wx + w * x;
    }
    if sum_w <= T::zero() {
        None
    } else {
        Some(sum_wx / sum_w)
    }
}

/// Weighted variance of scalar samples about their weighted mean.
///
/// Returns `None` when the weights sum to zero.
pub fn weighted_variance<T: RealField + Float + Copy>(values: &[T], weights: &[T]) -> Option<T> {
    let mean = weighted_mean(values, weights)?;
    let mut sum_w = T::zero();
    let mut sum_wd = T::zero();
    for (&x, &w) in values.iter().zip(weights) {
        let d = x - mean;
        sum_w = sum_w + w;
        sum_wd = sum_wd + w * d * d;
    }
    Some(sum_wd / sum_w)
}

/// Log-density of a univariate Gaussian at `x`.
///
/// Returns negative infinity for a non-positive standard deviation.
pub fn log_gaussian_density<T: RealField + Float + Copy>(x: T, mean: T, std_dev: T) -> T {
    if std_dev <= T::zero() {
        return T::neg_infinity();
    }
    let half = T::from(0.5).unwrap();
    let two_pi = T::from(::core::f64::consts::TAU).unwrap();
    let z = (x - mean) / std_dev;
    -half * z * z - Float::ln(std_dev) - half * Float::ln(two_pi)
}

/// Wall-clock stopwatch for the optional `--time` style output.
#[derive(Debug)]
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    /// Starts a new stopwatch.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Seconds elapsed since the stopwatch was started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

//! Gaussian smoothing kernel
//!
//! A smooth, symmetric similarity kernel over dynamic states. The
//! smoother only ever uses kernel *ratios*, so the normalization constant
//! is dropped and evaluation reduces to `exp(-d^2 / (2 b^2))` on squared
//! distances. The bandwidth sets the bias/variance trade-off jointly with
//! the particle count.

use nalgebra::RealField;
use num_traits::Float;

use crate::{Result, SmcError};

/// Unnormalized Gaussian kernel with a fixed bandwidth.
#[derive(Debug, Clone, Copy)]
pub struct GaussianKernel<T: RealField> {
    dimension: usize,
    bandwidth: T,
}

impl<T: RealField + Float + Copy> GaussianKernel<T> {
    /// Creates a kernel over a `dimension`-dimensional state with the
    /// given bandwidth.
    ///
    /// # Errors
    /// Returns [`SmcError::InvalidConfig`] for a zero dimension or a
    /// non-positive bandwidth.
    pub fn new(dimension: usize, bandwidth: T) -> Result<Self> {
        if dimension == 0 {
            return Err(SmcError::InvalidConfig("kernel dimension must be positive"));
        }
        if bandwidth <= T::zero() || !Float::is_finite(bandwidth) {
            return Err(SmcError::InvalidConfig("kernel bandwidth must be positive"));
        }
        Ok(Self {
            dimension,
            bandwidth,
        })
    }

    /// Rule-of-thumb bandwidth `P^(-1 / (d + 4))` for `count` particles,
    /// the usual starting point when nothing better is known.
    pub fn rule_of_thumb(dimension: usize, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(SmcError::InvalidConfig("particle count must be positive"));
        }
        let d = dimension as f64;
        let bandwidth = (count as f64).powf(-1.0 / (d + 4.0));
        Self::new(dimension, T::from(bandwidth).unwrap())
    }

    /// The kernel's state dimension.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The kernel bandwidth.
    #[inline]
    pub fn bandwidth(&self) -> T {
        self.bandwidth
    }

    /// Log-kernel value for a squared distance.
    #[inline]
    pub fn log_eval(&self, distance_squared: T) -> T {
        let two = T::from(2.0).unwrap();
        -distance_squared / (two * self.bandwidth * self.bandwidth)
    }

    /// Kernel value for a squared distance.
    #[inline]
    pub fn eval(&self, distance_squared: T) -> T {
        Float::exp(self.log_eval(distance_squared))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(GaussianKernel::new(2, 0.5_f64).is_ok());
        assert!(GaussianKernel::new(0, 0.5_f64).is_err());
        assert!(GaussianKernel::new(2, 0.0_f64).is_err());
        assert!(GaussianKernel::new(2, f64::NAN).is_err());
    }

    #[test]
    fn test_kernel_decreases_with_distance() {
        let kernel = GaussianKernel::new(1, 1.0_f64).unwrap();
        assert!((kernel.eval(0.0) - 1.0).abs() < 1e-12);
        assert!(kernel.eval(1.0) > kernel.eval(4.0));
        assert!(kernel.eval(100.0) < 1e-20);
    }

    #[test]
    fn test_bandwidth_scaling() {
        let narrow = GaussianKernel::new(1, 0.1_f64).unwrap();
        let wide = GaussianKernel::new(1, 10.0_f64).unwrap();
        // The same separation counts as far for the narrow kernel and
        // near for the wide one.
        assert!(narrow.eval(1.0) < 1e-10);
        assert!(wide.eval(1.0) > 0.99);
    }

    #[test]
    fn test_rule_of_thumb_shrinks_with_count() {
        let small = GaussianKernel::<f64>::rule_of_thumb(1, 100).unwrap();
        let large = GaussianKernel::<f64>::rule_of_thumb(1, 100_000).unwrap();
        assert!(large.bandwidth() < small.bandwidth());
        assert!(GaussianKernel::<f64>::rule_of_thumb(1, 0).is_err());
    }
}

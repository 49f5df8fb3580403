//! Gaussian random-walk proposal over the parameter partition
//!
//! The proposal lives in transformed coordinates: coordinates flagged by
//! the model's log mask are random-walked on their logarithm, keeping
//! positivity-constrained parameters in their support without rejection
//! at the boundary. The Metropolis-Hastings ratio picks up the Jacobian
//! of the transform through [`GaussianProposal::log_jacobian`].
//!
//! The covariance is held with its lower Cholesky factor; construction
//! and every covariance update verify positive definiteness and fail with
//! [`SmcError::NotPositiveDefinite`] otherwise.

use nalgebra::{RealField, SMatrix};
use num_traits::Float;

use crate::io::ProposalSource;
use crate::random::RandomSource;
use crate::types::spaces::{ParamCovariance, ParamVector};
use crate::{Result, SmcError};

/// Gaussian random-walk proposal with optional log-transformed coordinates.
#[derive(Debug, Clone)]
pub struct GaussianProposal<T: RealField, const NP: usize> {
    covariance: SMatrix<T, NP, NP>,
    factor: SMatrix<T, NP, NP>,
    log_mask: [bool; NP],
}

impl<T: RealField + Float + Copy, const NP: usize> GaussianProposal<T, NP> {
    /// Creates a proposal from a covariance in transformed coordinates.
    ///
    /// # Errors
    /// Returns [`SmcError::NotPositiveDefinite`] when the covariance has
    /// no Cholesky factorization.
    pub fn new(covariance: ParamCovariance<T, NP>, log_mask: [bool; NP]) -> Result<Self> {
        let matrix = *covariance.as_matrix();
        let factor = cholesky_lower(&matrix)?;
        Ok(Self {
            covariance: matrix,
            factor,
            log_mask,
        })
    }

    /// Creates a proposal from a scaled prior covariance, the startup path
    /// when no bootstrapped posterior is available.
    pub fn from_prior_covariance(
        covariance: ParamCovariance<T, NP>,
        log_mask: [bool; NP],
        scale: T,
    ) -> Result<Self> {
        if scale <= T::zero() || !Float::is_finite(scale) {
            return Err(SmcError::InvalidConfig("proposal scale must be positive"));
        }
        Self::new(covariance.scale(scale), log_mask)
    }

    /// Creates a proposal from a prior smoothing run's posterior,
    /// covariance scaled by `sd`.
    pub fn from_posterior(
        source: &dyn ProposalSource<T, NP>,
        log_mask: [bool; NP],
        sd: T,
    ) -> Result<Self> {
        if sd <= T::zero() || !Float::is_finite(sd) {
            return Err(SmcError::InvalidConfig("proposal scale must be positive"));
        }
        Self::new(source.covariance().scale(sd), log_mask)
    }

    /// The current covariance in transformed coordinates.
    pub fn covariance(&self) -> ParamCovariance<T, NP> {
        ParamCovariance::from_matrix(self.covariance)
    }

    /// The log-transform mask.
    pub fn log_mask(&self) -> &[bool; NP] {
        &self.log_mask
    }

    /// Replaces the covariance, keeping the previous one on failure.
    ///
    /// # Errors
    /// Returns [`SmcError::NotPositiveDefinite`] when the candidate has no
    /// Cholesky factorization; the proposal is left unchanged.
    pub fn set_covariance(&mut self, covariance: &SMatrix<T, NP, NP>) -> Result<()> {
        let factor = cholesky_lower(covariance)?;
        self.covariance = *covariance;
        self.factor = factor;
        Ok(())
    }

    /// Draws a proposal centered at `z` in transformed coordinates.
    pub fn propose(&self, rng: &mut RandomSource, z: &ParamVector<T, NP>) -> ParamVector<T, NP> {
        let mut eta = SMatrix::<T, NP, 1>::zeros();
        for i in 0..NP {
            eta[i] = rng.standard_normal();
        }
        ParamVector::from_svector(z.as_svector() + self.factor * eta)
    }

    /// Maps a parameter vector into transformed coordinates.
    ///
    /// # Errors
    /// Returns [`SmcError::InvalidConfig`] when a log-transformed
    /// coordinate is not strictly positive.
    pub fn to_transformed(&self, theta: &ParamVector<T, NP>) -> Result<ParamVector<T, NP>> {
        let mut z = [T::zero(); NP];
        for i in 0..NP {
            let v = *theta.index(i);
            z[i] = if self.log_mask[i] {
                if v <= T::zero() {
                    return Err(SmcError::InvalidConfig(
                        "log-transformed parameter coordinates must be positive",
                    ));
                }
                Float::ln(v)
            } else {
                v
            };
        }
        Ok(ParamVector::from_array(z))
    }

    /// Maps transformed coordinates back to the parameter space.
    pub fn from_transformed(&self, z: &ParamVector<T, NP>) -> ParamVector<T, NP> {
        let mut theta = [T::zero(); NP];
        for i in 0..NP {
            let v = *z.index(i);
            theta[i] = if self.log_mask[i] { Float::exp(v) } else { v };
        }
        ParamVector::from_array(theta)
    }

    /// Log of the transform Jacobian `|d theta / d z|` at `z`: the sum of
    /// the log-transformed coordinates.
    pub fn log_jacobian(&self, z: &ParamVector<T, NP>) -> T {
        let mut total = T::zero();
        for i in 0..NP {
            if self.log_mask[i] {
                total = total + *z.index(i);
            }
        }
        total
    }
}

/// Lower Cholesky factor of a positive-definite matrix.
fn cholesky_lower<T: RealField + Copy, const NP: usize>(
    matrix: &SMatrix<T, NP, NP>,
) -> Result<SMatrix<T, NP, NP>> {
    match matrix.cholesky() {
        Some(decomposition) => Ok(decomposition.l()),
        None => Err(SmcError::NotPositiveDefinite),
    }
}

/// Sample covariance of transformed chain states.
///
/// Returns `None` with fewer than two samples.
pub(crate) fn empirical_covariance<T: RealField + Float + Copy, const NP: usize>(
    history: &[ParamVector<T, NP>],
) -> Option<SMatrix<T, NP, NP>> {
    if history.len() < 2 {
        return None;
    }
    let n = T::from(history.len()).unwrap();
    let mut mean = SMatrix::<T, NP, 1>::zeros();
    for z in history {
        mean += z.as_svector();
    }
    mean /= n;

    let mut cov = SMatrix::<T, NP, NP>::zeros();
    for z in history {
        let d = z.as_svector() - mean;
        cov += d * d.transpose();
    }
    Some(cov / (n - T::one()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(values: [f64; 2]) -> ParamCovariance<f64, 2> {
        ParamCovariance::from_diagonal(&nalgebra::vector![values[0], values[1]])
    }

    #[test]
    fn test_non_positive_definite_rejected() {
        let bad = ParamCovariance::from_matrix(nalgebra::matrix![
            1.0, 2.0;
            2.0, 1.0
        ]);
        assert_eq!(
            GaussianProposal::new(bad, [false, false]).unwrap_err(),
            SmcError::NotPositiveDefinite
        );
    }

    #[test]
    fn test_invalid_scale_rejected() {
        assert!(
            GaussianProposal::from_prior_covariance(diag([1.0, 1.0]), [false, false], 0.0)
                .is_err()
        );
    }

    #[test]
    fn test_set_covariance_keeps_previous_on_failure() {
        let mut proposal = GaussianProposal::new(diag([1.0, 4.0]), [false, false]).unwrap();
        let bad = nalgebra::matrix![
            0.0, 0.0;
            0.0, -1.0
        ];
        assert!(proposal.set_covariance(&bad).is_err());
        assert!((proposal.covariance().as_matrix()[(1, 1)] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_transform_round_trip() {
        let proposal = GaussianProposal::new(diag([1.0, 1.0]), [true, false]).unwrap();
        let theta = ParamVector::from_array([2.0, -3.0]);
        let z = proposal.to_transformed(&theta).unwrap();
        assert!((z.index(0) - 2.0_f64.ln()).abs() < 1e-12);
        assert!((z.index(1) + 3.0).abs() < 1e-12);
        let back = proposal.from_transformed(&z);
        assert!((back.index(0) - 2.0).abs() < 1e-12);
        assert!((back.index(1) + 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_transform_rejects_nonpositive_masked_coordinate() {
        let proposal = GaussianProposal::new(diag([1.0, 1.0]), [true, false]).unwrap();
        assert!(proposal
            .to_transformed(&ParamVector::from_array([-1.0, 0.0]))
            .is_err());
    }

    #[test]
    fn test_log_jacobian_sums_masked_coordinates() {
        let proposal = GaussianProposal::new(diag([1.0, 1.0]), [true, false]).unwrap();
        let z = ParamVector::from_array([0.7, 100.0]);
        assert!((proposal.log_jacobian(&z) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_proposal_moments_follow_covariance() {
        let proposal = GaussianProposal::new(diag([0.25, 4.0]), [false, false]).unwrap();
        let mut rng = RandomSource::new(19);
        let center = ParamVector::from_array([1.0, -1.0]);
        let n = 20_000;
        let mut sum = [0.0_f64; 2];
        let mut sum_sq = [0.0_f64; 2];
        for _ in 0..n {
            let draw = proposal.propose(&mut rng, &center);
            for i in 0..2 {
                let d = draw.index(i) - center.index(i);
                sum[i] += d;
                sum_sq[i] += d * d;
            }
        }
        for (i, &target) in [0.25, 4.0].iter().enumerate() {
            let mean = sum[i] / n as f64;
            let var = sum_sq[i] / n as f64 - mean * mean;
            assert!(mean.abs() < 0.05, "coordinate {}: mean {}", i, mean);
            assert!(
                (var - target).abs() / target < 0.05,
                "coordinate {}: variance {} vs {}",
                i,
                var,
                target
            );
        }
    }

    #[test]
    fn test_empirical_covariance() {
        let history = vec![
            ParamVector::from_array([0.0, 0.0]),
            ParamVector::from_array([2.0, 0.0]),
            ParamVector::from_array([0.0, 2.0]),
            ParamVector::from_array([2.0, 2.0]),
        ];
        let cov = empirical_covariance(&history).unwrap();
        // Variance of {0, 2, 0, 2} with n-1 normalization is 4/3.
        assert!((cov[(0, 0)] - 4.0 / 3.0).abs() < 1e-12);
        assert!((cov[(1, 1)] - 4.0 / 3.0).abs() < 1e-12);
        assert!(cov[(0, 1)].abs() < 1e-12);
        assert!(empirical_covariance::<f64, 2>(&[]).is_none());
    }
}

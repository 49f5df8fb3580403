//! State-space model interface and built-in test models
//!
//! The inference engine treats the model as an opaque provider of three
//! state partitions (dynamic state, collapsed/marginalized state and
//! static parameters) plus prior sampling and density evaluation for
//! each, an observation density, and one-step trajectory integration.
//! Everything the filter, sampler and smoother know about the model flows
//! through [`StateSpaceModel`].

pub mod linear_gaussian;
pub mod stochastic_volatility;

pub use linear_gaussian::LinearGaussianModel;
pub use stochastic_volatility::StochasticVolatilityModel;

use nalgebra::RealField;
use num_traits::Float;

use crate::random::RandomSource;
use crate::types::spaces::{
    CollapsedVector, DynVector, ObsVector, ParamCovariance, ParamVector,
};
use crate::{Result, SmcError};

// ============================================================================
// Integrator Configuration
// ============================================================================

/// Step size and error tolerances forwarded opaquely to the model's
/// trajectory integrator.
///
/// The core never interprets these values; step-size control is the
/// integrator's concern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegratorConfig<T: RealField> {
    /// Nominal integration step size.
    pub step_size: T,
    /// Absolute error tolerance.
    pub abs_tolerance: T,
    /// Relative error tolerance.
    pub rel_tolerance: T,
}

impl<T: RealField + Float + Copy> IntegratorConfig<T> {
    /// Creates a validated integrator configuration.
    ///
    /// # Errors
    /// Returns [`SmcError::InvalidConfig`] when the step size or either
    /// tolerance is not strictly positive.
    pub fn new(step_size: T, abs_tolerance: T, rel_tolerance: T) -> Result<Self> {
        if step_size <= T::zero() || !Float::is_finite(step_size) {
            return Err(SmcError::InvalidConfig("integrator step size must be positive"));
        }
        if abs_tolerance <= T::zero() || rel_tolerance <= T::zero() {
            return Err(SmcError::InvalidConfig("integrator tolerances must be positive"));
        }
        Ok(Self {
            step_size,
            abs_tolerance,
            rel_tolerance,
        })
    }
}

impl<T: RealField + Float + Copy> Default for IntegratorConfig<T> {
    fn default() -> Self {
        Self {
            step_size: T::one(),
            abs_tolerance: T::from(1.0e-3).unwrap(),
            rel_tolerance: T::from(1.0e-3).unwrap(),
        }
    }
}

// ============================================================================
// Propagation Result
// ============================================================================

/// The outcome of advancing one particle across one observation interval.
#[derive(Debug, Clone)]
pub struct Propagated<T: RealField, const ND: usize, const NC: usize> {
    /// Dynamic state at the end of the interval.
    pub dynamic: DynVector<T, ND>,
    /// Collapsed state at the end of the interval.
    pub collapsed: CollapsedVector<T, NC>,
    /// Log-density contribution from collapsed/marginalized components,
    /// added to the particle's log-weight by the filter. Zero for models
    /// without marginalized structure.
    pub log_density: T,
}

// ============================================================================
// State-Space Model Trait
// ============================================================================

/// A continuous-time stochastic state-space model.
///
/// # Type Parameters
///
/// - `T`: Scalar type
/// - `ND`: Dynamic-state dimension
/// - `NC`: Collapsed-state dimension (zero when absent)
/// - `NP`: Static-parameter dimension
/// - `NY`: Observation dimension
pub trait StateSpaceModel<
    T: RealField + Float + Copy,
    const ND: usize,
    const NC: usize,
    const NP: usize,
    const NY: usize,
>
{
    /// Samples the dynamic-state prior.
    fn sample_dynamic_prior(&self, rng: &mut RandomSource) -> DynVector<T, ND>;

    /// Samples the collapsed-state prior. Models without collapsed
    /// structure keep the default.
    fn sample_collapsed_prior(&self, _rng: &mut RandomSource) -> CollapsedVector<T, NC> {
        CollapsedVector::zeros()
    }

    /// Samples the static-parameter prior.
    fn sample_param_prior(&self, rng: &mut RandomSource) -> ParamVector<T, NP>;

    /// Log-density of the static-parameter prior at `theta`.
    ///
    /// Negative infinity marks parameter values outside the prior support.
    fn log_param_prior(&self, theta: &ParamVector<T, NP>) -> T;

    /// Prior covariance of the parameters in proposal coordinates (log
    /// domain for coordinates flagged by [`StateSpaceModel::param_log_mask`]).
    /// Used to seed the MCMC proposal when no bootstrapped posterior is
    /// available.
    fn param_prior_covariance(&self) -> ParamCovariance<T, NP>;

    /// Marks positivity-constrained parameter coordinates. Proposals for a
    /// flagged coordinate random-walk its logarithm.
    fn param_log_mask(&self) -> [bool; NP] {
        [false; NP]
    }

    /// Advances one particle from `t0` to `t1`.
    ///
    /// `forcing` carries any external inputs valid over the interval.
    /// `disturbance` optionally supplies the process-noise vector (in
    /// standard-normal units); `None` lets the model draw its own noise
    /// from `rng`, an all-zero vector yields the deterministic trajectory.
    ///
    /// # Errors
    /// Returns [`SmcError::IntegratorFailure`] when the state leaves the
    /// integrable domain (e.g. becomes non-finite).
    #[allow(clippy::too_many_arguments)]
    fn propagate(
        &self,
        rng: &mut RandomSource,
        dynamic: &DynVector<T, ND>,
        collapsed: &CollapsedVector<T, NC>,
        theta: &ParamVector<T, NP>,
        t0: T,
        t1: T,
        forcing: Option<&[T]>,
        integrator: &IntegratorConfig<T>,
        disturbance: Option<&DynVector<T, ND>>,
    ) -> Result<Propagated<T, ND, NC>>;

    /// Log-density of observing `obs` given a particle's state.
    fn log_observation_density(
        &self,
        obs: &ObsVector<T, NY>,
        dynamic: &DynVector<T, ND>,
        collapsed: &CollapsedVector<T, NC>,
        theta: &ParamVector<T, NP>,
    ) -> T;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrator_config_validation() {
        assert!(IntegratorConfig::new(0.1_f64, 1e-3, 1e-3).is_ok());
        assert!(IntegratorConfig::new(0.0_f64, 1e-3, 1e-3).is_err());
        assert!(IntegratorConfig::new(0.1_f64, 0.0, 1e-3).is_err());
        assert!(IntegratorConfig::new(0.1_f64, 1e-3, -1.0).is_err());
    }

    #[test]
    fn test_integrator_config_default() {
        let cfg = IntegratorConfig::<f64>::default();
        assert!((cfg.step_size - 1.0).abs() < 1e-12);
        assert!((cfg.abs_tolerance - 1.0e-3).abs() < 1e-15);
    }
}

//! Resampling strategies for weighted particle ensembles
//!
//! A resampler maps an ensemble's weights to a resampling plan: an index
//! array such that particle `i` of the new ensemble is a copy of old
//! particle `plan[i]`. Every strategy satisfies the unbiasedness contract
//! that the expected number of copies of old particle `j` equals
//! `P * w_j / sum(w)`. Strategies differ in variance and cost:
//!
//! - [`StratifiedResampler`]: low-variance ordered selection, the default
//! - [`ExactStratifiedResampler`]: validation path for the fast scan
//! - [`MultinomialResampler`]: independent draws, the high-variance baseline
//! - [`MetropolisResampler`]: approximate exchange scheme, no global
//!   normalization, suited to the accelerator path

pub mod stratified;
pub mod multinomial;
pub mod metropolis;

pub use metropolis::MetropolisResampler;
pub use multinomial::MultinomialResampler;
pub use stratified::{ExactStratifiedResampler, StratifiedResampler};

use ::core::str::FromStr;
use nalgebra::RealField;
use num_traits::Float;

use crate::random::RandomSource;
use crate::{Result, SmcError};

/// Maps ensemble weights to a resampling plan.
pub trait Resampler<T: RealField + Float + Copy> {
    /// Produces a plan of the same length as `weights`.
    ///
    /// # Errors
    /// Returns [`SmcError::Degeneracy`] for a totally degenerate weight
    /// vector (all zero, or containing non-finite values): resampling such
    /// an ensemble would silently hide particle collapse.
    fn resample(&self, rng: &mut RandomSource, weights: &[T]) -> Result<Vec<usize>>;
}

/// Validates a weight vector and returns its sum.
///
/// Shared precondition of every strategy; see [`Resampler::resample`].
pub(crate) fn validate_weights<T: RealField + Float + Copy>(weights: &[T]) -> Result<T> {
    if weights.is_empty() {
        return Err(SmcError::Degeneracy);
    }
    let mut sum = T::zero();
    for &w in weights {
        if !Float::is_finite(w) || w < T::zero() {
            return Err(SmcError::Degeneracy);
        }
        sum = sum + w;
    }
    if sum <= T::zero() || !Float::is_finite(sum) {
        return Err(SmcError::Degeneracy);
    }
    Ok(sum)
}

// ============================================================================
// Strategy Selection
// ============================================================================

/// Resampling strategy selector, parsed from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResamplerKind {
    /// Stratified resampling (default).
    Stratified,
    /// Stratified resampling with exact per-stratum search.
    ExactStratified,
    /// Multinomial resampling.
    Multinomial,
    /// Approximate Metropolis exchange resampling.
    Metropolis,
}

impl ResamplerKind {
    /// Instantiates the selected strategy with its defaults.
    pub fn build<T: RealField + Float + Copy>(&self) -> Box<dyn Resampler<T>> {
        match self {
            ResamplerKind::Stratified => Box::new(StratifiedResampler),
            ResamplerKind::ExactStratified => Box::new(ExactStratifiedResampler),
            ResamplerKind::Multinomial => Box::new(MultinomialResampler),
            ResamplerKind::Metropolis => Box::new(MetropolisResampler::default()),
        }
    }
}

impl FromStr for ResamplerKind {
    type Err = SmcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stratified" => Ok(ResamplerKind::Stratified),
            "exact-stratified" => Ok(ResamplerKind::ExactStratified),
            "multinomial" => Ok(ResamplerKind::Multinomial),
            "metropolis" => Ok(ResamplerKind::Metropolis),
            _ => Err(SmcError::UnknownResampler),
        }
    }
}

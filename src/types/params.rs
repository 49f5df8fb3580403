//! Static parameter storage
//!
//! Static parameters are either one shared vector (parameters held fixed
//! during filtering) or one copy per particle (parameters are part of the
//! inferred state and follow the particles through resampling). The mode
//! is selected once per run.

use nalgebra::RealField;

use crate::types::spaces::ParamVector;
use crate::{Result, SmcError};

/// Shared or per-particle storage for the static parameter partition.
#[derive(Debug, Clone)]
pub enum ParamStorage<T: RealField, const NP: usize> {
    /// One parameter vector shared by every particle.
    Shared(ParamVector<T, NP>),
    /// One parameter vector per particle; resampled along with the states.
    Owned(Vec<ParamVector<T, NP>>),
}

impl<T: RealField + Copy, const NP: usize> ParamStorage<T, NP> {
    /// Creates shared storage holding `theta`.
    pub fn shared(theta: ParamVector<T, NP>) -> Self {
        ParamStorage::Shared(theta)
    }

    /// Creates owned storage with one copy of `theta` per particle.
    ///
    /// # Errors
    /// Returns [`SmcError::InvalidConfig`] when `count` is zero.
    pub fn owned(theta: ParamVector<T, NP>, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(SmcError::InvalidConfig("particle count must be positive"));
        }
        Ok(ParamStorage::Owned(vec![theta; count]))
    }

    /// Creates owned storage from per-particle vectors.
    ///
    /// # Errors
    /// Returns [`SmcError::InvalidConfig`] for an empty vector.
    pub fn owned_from(params: Vec<ParamVector<T, NP>>) -> Result<Self> {
        if params.is_empty() {
            return Err(SmcError::InvalidConfig("particle count must be positive"));
        }
        Ok(ParamStorage::Owned(params))
    }

    /// True when each particle carries its own parameter copy.
    #[inline]
    pub fn is_owned(&self) -> bool {
        matches!(self, ParamStorage::Owned(_))
    }

    /// The parameter vector seen by particle `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds in owned mode.
    #[inline]
    pub fn for_particle(&self, index: usize) -> &ParamVector<T, NP> {
        match self {
            ParamStorage::Shared(theta) => theta,
            ParamStorage::Owned(params) => &params[index],
        }
    }

    /// Overwrites particle `index`'s copy (owned mode) or the shared vector.
    pub fn set_for_particle(&mut self, index: usize, theta: ParamVector<T, NP>) {
        match self {
            ParamStorage::Shared(current) => *current = theta,
            ParamStorage::Owned(params) => params[index] = theta,
        }
    }

    /// Remaps owned copies through a resampling plan; shared storage is
    /// untouched.
    ///
    /// # Panics
    /// Panics if the plan length differs from the owned particle count.
    pub fn apply_resampling_plan(&mut self, plan: &[usize]) {
        if let ParamStorage::Owned(params) = self {
            assert_eq!(plan.len(), params.len());
            let remapped: Vec<_> = plan.iter().map(|&j| params[j]).collect();
            *params = remapped;
        }
    }
}

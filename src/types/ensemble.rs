//! Weighted particle ensembles
//!
//! An [`Ensemble`] is an ordered sequence of `P` particles, each holding a
//! dynamic-state vector, a collapsed-state vector, an unnormalized weight
//! and an ancestor index into the previous step's ensemble. The particle
//! count is fixed for the lifetime of one filtering run.
//!
//! Weights are defined only up to normalization. They must be non-negative
//! and finite with a positive sum before resampling; an all-zero or
//! non-finite weight vector is the fatal degeneracy condition and every
//! operation that depends on weight validity reports it as
//! [`SmcError::Degeneracy`] rather than silently patching it.

use nalgebra::RealField;
use num_traits::Float;

use crate::types::spaces::{CollapsedVector, DynVector};
use crate::utils::effective_sample_size;
use crate::{Result, SmcError};

/// A fixed-size ensemble of weighted particles.
#[derive(Debug, Clone)]
pub struct Ensemble<T: RealField, const ND: usize, const NC: usize> {
    dynamic: Vec<DynVector<T, ND>>,
    collapsed: Vec<CollapsedVector<T, NC>>,
    weights: Vec<T>,
    ancestors: Vec<usize>,
}

impl<T: RealField + Float + Copy, const ND: usize, const NC: usize> Ensemble<T, ND, NC> {
    /// Creates an ensemble of `count` particles at the origin with uniform
    /// weights and identity ancestry.
    ///
    /// # Errors
    /// Returns [`SmcError::InvalidConfig`] when `count` is zero.
    pub fn new(count: usize) -> Result<Self> {
        if count == 0 {
            return Err(SmcError::InvalidConfig("particle count must be positive"));
        }
        Ok(Self {
            dynamic: vec![DynVector::zeros(); count],
            collapsed: vec![CollapsedVector::zeros(); count],
            weights: vec![T::one(); count],
            ancestors: (0..count).collect(),
        })
    }

    /// Number of particles. Fixed for the lifetime of a run.
    #[inline]
    pub fn len(&self) -> usize {
        self.dynamic.len()
    }

    /// True when the ensemble holds no particles (never the case for an
    /// ensemble built through [`Ensemble::new`]).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dynamic.is_empty()
    }

    /// Dynamic-state vectors, one per particle.
    #[inline]
    pub fn dynamic(&self) -> &[DynVector<T, ND>] {
        &self.dynamic
    }

    /// Collapsed-state vectors, one per particle.
    #[inline]
    pub fn collapsed(&self) -> &[CollapsedVector<T, NC>] {
        &self.collapsed
    }

    /// Unnormalized weights, one per particle.
    #[inline]
    pub fn weights(&self) -> &[T] {
        &self.weights
    }

    /// Ancestor indices into the previous step's ensemble.
    #[inline]
    pub fn ancestors(&self) -> &[usize] {
        &self.ancestors
    }

    /// Overwrites one particle's state partitions.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn set_state(
        &mut self,
        index: usize,
        dynamic: DynVector<T, ND>,
        collapsed: CollapsedVector<T, NC>,
    ) {
        self.dynamic[index] = dynamic;
        self.collapsed[index] = collapsed;
    }

    /// Replaces every particle's state from parallel-computed slices.
    ///
    /// # Panics
    /// Panics if the slice lengths differ from the particle count.
    pub fn set_states(
        &mut self,
        dynamic: Vec<DynVector<T, ND>>,
        collapsed: Vec<CollapsedVector<T, NC>>,
    ) {
        assert_eq!(dynamic.len(), self.len());
        assert_eq!(collapsed.len(), self.len());
        self.dynamic = dynamic;
        self.collapsed = collapsed;
    }

    /// Effective sample size of the current weights, in `[1, P]`.
    ///
    /// Zero signals degeneracy.
    #[inline]
    pub fn ess(&self) -> T {
        effective_sample_size(&self.weights)
    }

    /// Normalized copy of the weights.
    ///
    /// # Errors
    /// Returns [`SmcError::Degeneracy`] when the weights sum to zero or
    /// contain non-finite values.
    pub fn normalized_weights(&self) -> Result<Vec<T>> {
        let mut sum = T::zero();
        for &w in &self.weights {
            if !Float::is_finite(w) || w < T::zero() {
                return Err(SmcError::Degeneracy);
            }
            sum = sum + w;
        }
        if sum <= T::zero() || !Float::is_finite(sum) {
            return Err(SmcError::Degeneracy);
        }
        Ok(self.weights.iter().map(|&w| w / sum).collect())
    }

    /// Resets every weight to one and ancestry to identity.
    pub fn reset_weights(&mut self) {
        for w in &mut self.weights {
            *w = T::one();
        }
        for (i, a) in self.ancestors.iter_mut().enumerate() {
            *a = i;
        }
    }

    /// Multiplies each weight by `exp(log_factors[i])` and returns the
    /// marginal log-likelihood increment `log(Σ wᵢ·exp(gᵢ) / Σ wᵢ)`.
    ///
    /// The update is performed with a max-shift so a single well-supported
    /// particle never underflows to an all-zero ensemble.
    ///
    /// # Errors
    /// Returns [`SmcError::Degeneracy`] when the incoming weights are
    /// already degenerate or the reweighted ensemble has zero total weight.
    pub fn reweight_log(&mut self, log_factors: &[T]) -> Result<T> {
        assert_eq!(log_factors.len(), self.len());

        let mut prior_sum = T::zero();
        for &w in &self.weights {
            if !Float::is_finite(w) || w < T::zero() {
                return Err(SmcError::Degeneracy);
            }
            prior_sum = prior_sum + w;
        }
        if prior_sum <= T::zero() {
            return Err(SmcError::Degeneracy);
        }

        let mut max_g = T::neg_infinity();
        for &g in log_factors {
            if g > max_g {
                max_g = g;
            }
        }
        if !Float::is_finite(max_g) {
            // Every particle assigns zero (or NaN) likelihood.
            return Err(SmcError::Degeneracy);
        }

        let mut posterior_sum = T::zero();
        for (w, &g) in self.weights.iter_mut().zip(log_factors) {
            *w = *w * Float::exp(g - max_g);
            posterior_sum = posterior_sum + *w;
        }
        if posterior_sum <= T::zero() || !Float::is_finite(posterior_sum) {
            return Err(SmcError::Degeneracy);
        }

        Ok(max_g + Float::ln(posterior_sum) - Float::ln(prior_sum))
    }

    /// Rebuilds the ensemble so particle `i` becomes a copy of old particle
    /// `plan[i]`, records `plan` as the new ancestry, and resets weights to
    /// uniform.
    ///
    /// # Panics
    /// Panics if the plan length differs from the particle count or an
    /// index is out of bounds.
    pub fn apply_resampling_plan(&mut self, plan: &[usize]) {
        assert_eq!(plan.len(), self.len());
        let new_dynamic: Vec<_> = plan.iter().map(|&j| self.dynamic[j]).collect();
        let new_collapsed: Vec<_> = plan.iter().map(|&j| self.collapsed[j]).collect();
        self.dynamic = new_dynamic;
        self.collapsed = new_collapsed;
        self.ancestors.copy_from_slice(plan);
        for w in &mut self.weights {
            *w = T::one();
        }
    }

    /// Weighted mean and componentwise variance of the dynamic state.
    ///
    /// # Errors
    /// Returns [`SmcError::Degeneracy`] for degenerate weights.
    pub fn dynamic_moments(&self) -> Result<(DynVector<T, ND>, DynVector<T, ND>)> {
        let normalized = self.normalized_weights()?;
        let mut mean = DynVector::<T, ND>::zeros();
        for (x, &w) in self.dynamic.iter().zip(&normalized) {
            mean = mean + x.scale(w);
        }
        let mut var = DynVector::<T, ND>::zeros();
        for (x, &w) in self.dynamic.iter().zip(&normalized) {
            let d = *x - mean;
            let sq = d.map(|v| v * v);
            var = var + sq.scale(w);
        }
        Ok((mean, var))
    }
}

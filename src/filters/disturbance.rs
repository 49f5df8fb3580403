//! Disturbance particle filter
//!
//! The filter, not the model, draws each particle's process-noise vector
//! (in standard-normal units) and hands it to the integrator. Pulling the
//! disturbances out of the model decouples the noise stream from the
//! dynamics and makes the injected noise scalable: a scale of one
//! reproduces the bootstrap filter's transition distribution, a scale of
//! zero drives every particle along its deterministic trajectory, which
//! is what the zero-noise replay property tests against.

use nalgebra::RealField;
use num_traits::Float;

use crate::filters::particle::{run_filter, FilterConfig, FilterOutcome, Variant};
use crate::io::{FilterSink, ForcingStream, InitSource, ObservationStream};
use crate::models::StateSpaceModel;
use crate::random::RandomSource;
use crate::resamplers::Resampler;
use crate::types::params::ParamStorage;
use crate::{Result, SmcError};

/// Disturbance particle filter with scalable injected noise.
#[derive(Debug, Clone)]
pub struct DisturbanceParticleFilter<T: RealField> {
    config: FilterConfig<T>,
    noise_scale: T,
}

impl<T: RealField + Float + Copy + Send + Sync> DisturbanceParticleFilter<T> {
    /// Creates a filter injecting unit-scale disturbances.
    pub fn new(config: FilterConfig<T>) -> Self {
        Self {
            config,
            noise_scale: T::one(),
        }
    }

    /// Sets the disturbance scale. Zero yields deterministic propagation.
    ///
    /// # Errors
    /// Returns [`SmcError::InvalidConfig`] for a negative or non-finite
    /// scale.
    pub fn with_noise_scale(mut self, scale: T) -> Result<Self> {
        if scale < T::zero() || !Float::is_finite(scale) {
            return Err(SmcError::InvalidConfig(
                "disturbance noise scale must be non-negative",
            ));
        }
        self.noise_scale = scale;
        Ok(self)
    }

    /// The filter's configuration.
    pub fn config(&self) -> &FilterConfig<T> {
        &self.config
    }

    /// Runs the filter to `horizon`. See
    /// [`crate::filters::particle::ParticleFilter::filter`] for the shared
    /// contract.
    #[allow(clippy::too_many_arguments)]
    pub fn filter<M, const ND: usize, const NC: usize, const NP: usize, const NY: usize>(
        &self,
        model: &M,
        root: &RandomSource,
        horizon: T,
        obs: &dyn ObservationStream<T, NY>,
        forcing: Option<&dyn ForcingStream<T>>,
        resampler: &dyn Resampler<T>,
        params: ParamStorage<T, NP>,
        init: Option<&dyn InitSource<T, ND, NC, NP>>,
        sink: Option<&mut dyn FilterSink<T, ND, NC>>,
    ) -> Result<FilterOutcome<T, ND, NC, NP>>
    where
        M: StateSpaceModel<T, ND, NC, NP, NY> + Sync,
    {
        run_filter(
            Variant::Disturbance {
                scale: self.noise_scale,
            },
            &self.config,
            model,
            root,
            horizon,
            obs,
            forcing,
            resampler,
            params,
            init,
            sink,
        )
    }
}

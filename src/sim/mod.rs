//! Forward simulation and prediction
//!
//! Runs an ensemble forward through a time grid with no weighting and no
//! resampling: every particle is an independent draw from the model's
//! transition dynamics. Used standalone to simulate synthetic data sets,
//! and as the prediction step that extends a completed filtering run past
//! the data horizon.

use nalgebra::RealField;
use num_traits::Float;

use log::info;

use crate::filters::particle::FilterOutcome;
use crate::io::{FilterSink, ForcingStream};
use crate::models::{IntegratorConfig, StateSpaceModel};
use crate::random::RandomSource;
use crate::types::ensemble::Ensemble;
use crate::types::params::ParamStorage;
use crate::{Result, SmcError};

/// Substream tag for initial-condition draws.
const TAG_SIM_INIT: u64 = 0x4d4d_0001;
/// Substream tag base for per-step propagation noise.
const TAG_SIM_STEP: u64 = 0x4d4d_0002;

/// Unweighted forward simulator.
#[derive(Debug, Clone)]
pub struct Simulator<T: RealField> {
    integrator: IntegratorConfig<T>,
}

impl<T: RealField + Float + Copy> Simulator<T> {
    /// Creates a simulator with the given integrator configuration.
    pub fn new(integrator: IntegratorConfig<T>) -> Self {
        Self { integrator }
    }

    /// Samples a fresh ensemble of `count` particles from the model's
    /// priors.
    pub fn initial_ensemble<M, const ND: usize, const NC: usize, const NP: usize, const NY: usize>(
        model: &M,
        root: &RandomSource,
        count: usize,
    ) -> Result<Ensemble<T, ND, NC>>
    where
        M: StateSpaceModel<T, ND, NC, NP, NY>,
    {
        let mut ensemble = Ensemble::new(count)?;
        let mut rng = root.substream(TAG_SIM_INIT);
        for i in 0..count {
            let dynamic = model.sample_dynamic_prior(&mut rng);
            let collapsed = model.sample_collapsed_prior(&mut rng);
            ensemble.set_state(i, dynamic, collapsed);
        }
        Ok(ensemble)
    }

    /// Advances `ensemble` through `times`, which must be strictly
    /// increasing; the ensemble is taken to sit at `times[0]` and each
    /// later time is recorded to `sink` as it is reached.
    ///
    /// # Errors
    /// [`SmcError::InvalidConfig`] for a grid with fewer than two points
    /// or out-of-order times, [`SmcError::IntegratorFailure`] when
    /// propagation fails.
    #[allow(clippy::too_many_arguments)]
    pub fn simulate<M, const ND: usize, const NC: usize, const NP: usize, const NY: usize>(
        &self,
        model: &M,
        root: &RandomSource,
        times: &[T],
        params: &ParamStorage<T, NP>,
        mut ensemble: Ensemble<T, ND, NC>,
        forcing: Option<&dyn ForcingStream<T>>,
        mut sink: Option<&mut dyn FilterSink<T, ND, NC>>,
    ) -> Result<Ensemble<T, ND, NC>>
    where
        M: StateSpaceModel<T, ND, NC, NP, NY>,
    {
        if times.len() < 2 {
            return Err(SmcError::InvalidConfig(
                "simulation grid needs at least two time points",
            ));
        }
        for window in times.windows(2) {
            if window[1] <= window[0] {
                return Err(SmcError::InvalidConfig(
                    "simulation times must be strictly increasing",
                ));
            }
        }

        let count = ensemble.len();
        let identity: Vec<usize> = (0..count).collect();
        info!(
            "simulator: {} particles over {} intervals",
            count,
            times.len() - 1
        );

        for (step, window) in times.windows(2).enumerate() {
            let (t0, t1) = (window[0], window[1]);
            let interval_forcing = forcing.and_then(|f| f.at(t0));
            for i in 0..count {
                let mut rng = root
                    .substream(TAG_SIM_STEP.wrapping_add(step as u64))
                    .particle_stream(step as u64, i as u64);
                let out = model.propagate(
                    &mut rng,
                    &ensemble.dynamic()[i],
                    &ensemble.collapsed()[i],
                    params.for_particle(i),
                    t0,
                    t1,
                    interval_forcing,
                    &self.integrator,
                    None,
                )?;
                ensemble.set_state(i, out.dynamic, out.collapsed);
            }
            if let Some(s) = sink.as_deref_mut() {
                s.record_step(t1, &ensemble, &identity)?;
            }
        }
        Ok(ensemble)
    }

    /// Extends a completed filtering run past the data horizon: the
    /// outcome's final ensemble and parameters are simulated forward
    /// through `times`.
    #[allow(clippy::too_many_arguments)]
    pub fn predict<M, const ND: usize, const NC: usize, const NP: usize, const NY: usize>(
        &self,
        model: &M,
        root: &RandomSource,
        times: &[T],
        outcome: &FilterOutcome<T, ND, NC, NP>,
        forcing: Option<&dyn ForcingStream<T>>,
        sink: Option<&mut dyn FilterSink<T, ND, NC>>,
    ) -> Result<Ensemble<T, ND, NC>>
    where
        M: StateSpaceModel<T, ND, NC, NP, NY>,
    {
        self.simulate(
            model,
            root,
            times,
            &outcome.params,
            outcome.ensemble.clone(),
            forcing,
            sink,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LinearGaussianModel;
    use crate::types::spaces::ParamVector;
    use crate::types::trajectory::FilterHistory;

    fn lg_model() -> LinearGaussianModel<f64> {
        LinearGaussianModel::new(0.0, 0.5, 5.0, 0.1, 0.5, 0.3, 1.0, 0.3).unwrap()
    }

    #[test]
    fn test_grid_validation() {
        let model = lg_model();
        let sim = Simulator::new(IntegratorConfig::default());
        let root = RandomSource::new(1);
        let ensemble = Simulator::initial_ensemble(&model, &root, 8).unwrap();
        let params = ParamStorage::shared(ParamVector::from_array([0.5, 1.0]));
        assert!(sim
            .simulate(&model, &root, &[0.0], &params, ensemble.clone(), None, None)
            .is_err());
        assert!(sim
            .simulate(
                &model,
                &root,
                &[0.0, 2.0, 1.0],
                &params,
                ensemble,
                None,
                None
            )
            .is_err());
    }

    #[test]
    fn test_simulation_relaxes_toward_mean() {
        // Initialized far from the long-run mean, the ensemble average
        // must relax toward it over a long horizon.
        let model = lg_model();
        let sim = Simulator::new(IntegratorConfig::default());
        let root = RandomSource::new(2);
        let ensemble = Simulator::initial_ensemble(&model, &root, 512).unwrap();
        let params = ParamStorage::shared(ParamVector::from_array([0.5, 1.0]));
        let times: Vec<f64> = (0..=20).map(|k| k as f64).collect();
        let out = sim
            .simulate(&model, &root, &times, &params, ensemble, None, None)
            .unwrap();
        let (mean, var) = out.dynamic_moments().unwrap();
        // Stationary distribution: mean 0, variance sigma^2 / (2 lambda) = 1.
        assert!(mean.index(0).abs() < 0.2);
        assert!((var.index(0) - 1.0).abs() < 0.3);
    }

    #[test]
    fn test_simulation_records_each_interval() {
        let model = lg_model();
        let sim = Simulator::new(IntegratorConfig::default());
        let root = RandomSource::new(3);
        let ensemble = Simulator::initial_ensemble(&model, &root, 16).unwrap();
        let params = ParamStorage::shared(ParamVector::from_array([0.5, 1.0]));
        let mut history = FilterHistory::<f64, 1, 0>::new();
        sim.simulate(
            &model,
            &root,
            &[0.0, 1.0, 2.0, 3.0],
            &params,
            ensemble,
            None,
            Some(&mut history),
        )
        .unwrap();
        assert_eq!(history.len(), 3);
        assert!((history.step(2).time - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_simulation_reproducible() {
        let model = lg_model();
        let sim = Simulator::new(IntegratorConfig::default());
        let params = ParamStorage::shared(ParamVector::from_array([0.5, 1.0]));
        let run = || {
            let root = RandomSource::new(4);
            let ensemble = Simulator::initial_ensemble(&model, &root, 32).unwrap();
            let out = sim
                .simulate(&model, &root, &[0.0, 1.0, 2.0], &params, ensemble, None, None)
                .unwrap();
            *out.dynamic()[7].index(0)
        };
        assert_eq!(run(), run());
    }
}

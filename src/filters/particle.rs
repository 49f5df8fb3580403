//! Bootstrap particle filter
//!
//! Drives a weighted ensemble through the observation times, propagating
//! every particle independently, weighting against observations, and
//! resampling when the effective sample size falls below the configured
//! fraction of the particle count. The running sum of
//! `log(mean weighted likelihood)` increments is the filter's unbiased
//! estimate of the marginal log-likelihood, the quantity particle MCMC
//! consumes.
//!
//! Per-particle propagation and weighting are embarrassingly parallel and
//! run under rayon when the `parallel` feature is enabled; every particle
//! draws from a substream derived from (seed, step, index), so results do
//! not depend on scheduling. Resampling is the one synchronization point
//! inside a step: all weights must be final before the plan is computed.

use nalgebra::RealField;
use num_traits::Float;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use log::{debug, info};

use crate::io::{FilterSink, InitSource, ObservationStream};
use crate::models::{IntegratorConfig, StateSpaceModel};
use crate::random::RandomSource;
use crate::resamplers::Resampler;
use crate::types::ensemble::Ensemble;
use crate::types::params::ParamStorage;
use crate::types::spaces::{CollapsedVector, DynVector};
use crate::io::ForcingStream;
use crate::{Result, SmcError};

/// Substream tag for initial-condition draws.
const TAG_INIT: u64 = 0x1717_0001;
/// Substream tag base for per-step resampling offsets.
const TAG_RESAMPLE: u64 = 0x1717_0002;
/// Substream tag base for per-step propagation noise.
const TAG_PROPAGATE: u64 = 0x1717_0003;

// ============================================================================
// Configuration
// ============================================================================

/// Particle filter configuration.
#[derive(Debug, Clone)]
pub struct FilterConfig<T: RealField> {
    /// Ensemble size `P`.
    pub particle_count: usize,
    /// Resample when `ESS < ess_threshold * P`. One means every step.
    pub ess_threshold: T,
    /// Start time of the filtering run.
    pub start_time: T,
    /// Step size and tolerances forwarded to the model's integrator.
    pub integrator: IntegratorConfig<T>,
}

impl<T: RealField + Float + Copy> FilterConfig<T> {
    /// Creates a validated configuration.
    ///
    /// # Errors
    /// Returns [`SmcError::InvalidConfig`] for a zero particle count or an
    /// ESS threshold outside `(0, 1]`.
    pub fn new(particle_count: usize, ess_threshold: T, integrator: IntegratorConfig<T>) -> Result<Self> {
        if particle_count == 0 {
            return Err(SmcError::InvalidConfig("particle count must be positive"));
        }
        if ess_threshold <= T::zero() || ess_threshold > T::one() || !Float::is_finite(ess_threshold) {
            return Err(SmcError::InvalidConfig("ESS threshold must lie in (0, 1]"));
        }
        Ok(Self {
            particle_count,
            ess_threshold,
            start_time: T::zero(),
            integrator,
        })
    }

    /// Sets the start time of the run.
    pub fn with_start_time(mut self, start_time: T) -> Self {
        self.start_time = start_time;
        self
    }
}

/// The result of a completed filtering run.
#[derive(Debug, Clone)]
pub struct FilterOutcome<T: RealField, const ND: usize, const NC: usize, const NP: usize> {
    /// Final ensemble at the last observation time.
    pub ensemble: Ensemble<T, ND, NC>,
    /// Final parameter storage (remapped through resampling in owned mode).
    pub params: ParamStorage<T, NP>,
    /// Unbiased marginal log-likelihood estimate.
    pub log_likelihood: T,
    /// Number of observation steps processed.
    pub steps: usize,
    /// Number of resampling events triggered.
    pub resample_count: usize,
}

// ============================================================================
// Variant Hooks
// ============================================================================

/// Weighting/propagation variants sharing the filter skeleton.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Variant<T> {
    /// Propagate from the transition prior, weight by the observation.
    Bootstrap,
    /// First-stage look-ahead weighting and mandatory resampling before
    /// propagation, with second-stage correction weights.
    Auxiliary,
    /// Filter-drawn disturbance noise scaled by the given factor.
    Disturbance { scale: T },
}

// ============================================================================
// Bootstrap Filter
// ============================================================================

/// The bootstrap particle filter.
#[derive(Debug, Clone)]
pub struct ParticleFilter<T: RealField> {
    config: FilterConfig<T>,
}

impl<T: RealField + Float + Copy + Send + Sync> ParticleFilter<T> {
    /// Creates a filter with the given configuration.
    pub fn new(config: FilterConfig<T>) -> Self {
        Self { config }
    }

    /// The filter's configuration.
    pub fn config(&self) -> &FilterConfig<T> {
        &self.config
    }

    /// Runs the filter to `horizon`, consuming every observation at or
    /// before it.
    ///
    /// `params` enters in shared or owned mode and is returned in the
    /// outcome; owned copies follow the particles through resampling.
    /// When `sink` is given, each step's pre-resampling ensemble, weights
    /// and ancestry are recorded for smoothing.
    ///
    /// # Errors
    /// [`SmcError::Degeneracy`] when the weighted ensemble collapses,
    /// [`SmcError::IntegratorFailure`] when propagation fails.
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
            Variant::Bootstrap,
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

// ============================================================================
// Shared State Machine
// ============================================================================

/// Runs the six-step filter state machine for one variant.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_filter<T, M, const ND: usize, const NC: usize, const NP: usize, const NY: usize>(
    variant: Variant<T>,
    config: &FilterConfig<T>,
    model: &M,
    root: &RandomSource,
    horizon: T,
    obs: &dyn ObservationStream<T, NY>,
    forcing: Option<&dyn ForcingStream<T>>,
    resampler: &dyn Resampler<T>,
    mut params: ParamStorage<T, NP>,
    init: Option<&dyn InitSource<T, ND, NC, NP>>,
    mut sink: Option<&mut dyn FilterSink<T, ND, NC>>,
) -> Result<FilterOutcome<T, ND, NC, NP>>
where
    T: RealField + Float + Copy + Send + Sync,
    M: StateSpaceModel<T, ND, NC, NP, NY> + Sync,
{
    let count = config.particle_count;
    let mut ensemble = Ensemble::new(count)?;

    // Initialize: supplied initial conditions where available, model
    // priors otherwise.
    let mut init_rng = root.substream(TAG_INIT);
    for i in 0..count {
        let dynamic = init
            .and_then(|s| s.dynamic(i))
            .unwrap_or_else(|| model.sample_dynamic_prior(&mut init_rng));
        let collapsed = init
            .and_then(|s| s.collapsed(i))
            .unwrap_or_else(|| model.sample_collapsed_prior(&mut init_rng));
        ensemble.set_state(i, dynamic, collapsed);
    }

    let step_count = obs.count_unique_times(horizon);
    info!(
        "particle filter: {} particles, {} observation steps to t = {:?}",
        count, step_count, horizon
    );

    let mut log_likelihood = T::zero();
    let mut resample_count = 0usize;
    let mut ancestors: Vec<usize> = (0..count).collect();
    let mut t_prev = config.start_time;

    for step in 0..step_count {
        let t_next = obs.time(step);
        let y = *obs.value(step);
        let interval_forcing = forcing.and_then(|f| f.at(t_prev));

        // Auxiliary first stage: pilot-propagate deterministically, fold
        // the look-ahead likelihood into the weights, and resample before
        // the stochastic move.
        let mut lookahead: Option<Vec<T>> = None;
        if matches!(variant, Variant::Auxiliary) {
            let pilot = propagate_ensemble(
                model,
                root,
                &ensemble,
                &params,
                t_prev,
                t_next,
                interval_forcing,
                &config.integrator,
                step,
                PropagationNoise::Zero,
            )?;
            let stage_one: Vec<T> = pilot
                .iter()
                .enumerate()
                .map(|(i, (x, c, _))| {
                    model.log_observation_density(&y, x, c, params.for_particle(i))
                })
                .collect();
            log_likelihood = log_likelihood + ensemble.reweight_log(&stage_one)?;

            let mut resample_rng = root.substream(TAG_RESAMPLE.wrapping_add(step as u64));
            let plan = resampler.resample(&mut resample_rng, ensemble.weights())?;
            ensemble.apply_resampling_plan(&plan);
            params.apply_resampling_plan(&plan);
            ancestors = plan.clone();
            resample_count += 1;
            lookahead = Some(plan.iter().map(|&j| stage_one[j]).collect());
        }

        // Propagate: embarrassingly parallel across particles.
        let noise = match variant {
            Variant::Disturbance { scale } => PropagationNoise::Drawn { scale },
            _ => PropagationNoise::Model,
        };
        let propagated = propagate_ensemble(
            model,
            root,
            &ensemble,
            &params,
            t_prev,
            t_next,
            interval_forcing,
            &config.integrator,
            step,
            noise,
        )?;

        // Weight: observation likelihood plus any collapsed-state
        // log-density contribution, less the first-stage correction for
        // the auxiliary variant.
        let log_factors: Vec<T> = propagated
            .iter()
            .enumerate()
            .map(|(i, (x, c, ld))| {
                let g = *ld + model.log_observation_density(&y, x, c, params.for_particle(i));
                match &lookahead {
                    Some(stage_one) => g - stage_one[i],
                    None => g,
                }
            })
            .collect();

        let (dynamic, collapsed): (Vec<_>, Vec<_>) =
            propagated.into_iter().map(|(x, c, _)| (x, c)).unzip();
        ensemble.set_states(dynamic, collapsed);
        log_likelihood = log_likelihood + ensemble.reweight_log(&log_factors)?;

        // Record the pre-resampling snapshot with the ancestry that
        // produced it.
        if let Some(s) = sink.as_deref_mut() {
            s.record_step(t_next, &ensemble, &ancestors)?;
        }

        // Resample decision: a barrier over the finalized weights. The
        // auxiliary variant already resampled this step.
        ancestors = (0..count).collect();
        if !matches!(variant, Variant::Auxiliary) {
            let ess = ensemble.ess();
            if ess <= T::zero() {
                return Err(SmcError::Degeneracy);
            }
            if ess < config.ess_threshold * T::from(count).unwrap() {
                let mut resample_rng = root.substream(TAG_RESAMPLE.wrapping_add(step as u64));
                let plan = resampler.resample(&mut resample_rng, ensemble.weights())?;
                ensemble.apply_resampling_plan(&plan);
                params.apply_resampling_plan(&plan);
                ancestors = plan;
                resample_count += 1;
                debug!("step {}: resampled (ESS {:?} of {})", step, ess, count);
            }
        }

        t_prev = t_next;
    }

    info!(
        "particle filter done: log-likelihood {:?}, {} resampling events",
        log_likelihood, resample_count
    );
    Ok(FilterOutcome {
        ensemble,
        params,
        log_likelihood,
        steps: step_count,
        resample_count,
    })
}

/// How propagation noise is supplied for one step.
#[derive(Debug, Clone, Copy)]
enum PropagationNoise<T> {
    /// The model draws its own noise from the particle substream.
    Model,
    /// Deterministic pilot move (all-zero disturbance).
    Zero,
    /// The filter draws standard-normal disturbances and scales them.
    Drawn { scale: T },
}

/// Advances every particle from `t0` to `t1`, returning per-particle
/// (dynamic, collapsed, log-density contribution) triples in index order.
#[allow(clippy::too_many_arguments)]
fn propagate_ensemble<T, M, const ND: usize, const NC: usize, const NP: usize, const NY: usize>(
    model: &M,
    root: &RandomSource,
    ensemble: &Ensemble<T, ND, NC>,
    params: &ParamStorage<T, NP>,
    t0: T,
    t1: T,
    forcing: Option<&[T]>,
    integrator: &IntegratorConfig<T>,
    step: usize,
    noise: PropagationNoise<T>,
) -> Result<Vec<(DynVector<T, ND>, CollapsedVector<T, NC>, T)>>
where
    T: RealField + Float + Copy + Send + Sync,
    M: StateSpaceModel<T, ND, NC, NP, NY> + Sync,
{
    let propagate_one = |i: usize| -> Result<(DynVector<T, ND>, CollapsedVector<T, NC>, T)> {
        let mut rng = root
            .substream(TAG_PROPAGATE.wrapping_add(step as u64))
            .particle_stream(step as u64, i as u64);
        let disturbance = match noise {
            PropagationNoise::Model => None,
            PropagationNoise::Zero => Some(DynVector::zeros()),
            PropagationNoise::Drawn { scale } => {
                let mut w = [T::zero(); ND];
                for v in &mut w {
                    *v = scale * rng.standard_normal::<T>();
                }
                Some(DynVector::from_array(w))
            }
        };
        let out = model.propagate(
            &mut rng,
            &ensemble.dynamic()[i],
            &ensemble.collapsed()[i],
            params.for_particle(i),
            t0,
            t1,
            forcing,
            integrator,
            disturbance.as_ref(),
        )?;
        Ok((out.dynamic, out.collapsed, out.log_density))
    };

    #[cfg(feature = "parallel")]
    let results: Vec<Result<_>> = (0..ensemble.len())
        .into_par_iter()
        .map(propagate_one)
        .collect();
    #[cfg(not(feature = "parallel"))]
    let results: Vec<Result<_>> = (0..ensemble.len()).map(propagate_one).collect();

    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LinearGaussianModel, Propagated};
    use crate::io::MemoryObservations;
    use crate::resamplers::StratifiedResampler;
    use crate::types::spaces::{ObsVector, ParamVector};
    use crate::types::trajectory::FilterHistory;

    fn lg_model() -> LinearGaussianModel<f64> {
        LinearGaussianModel::new(0.0, 0.5, 0.0, 1.0, 0.5, 0.3, 1.0, 0.3).unwrap()
    }

    fn observations(values: &[f64]) -> MemoryObservations<f64, 1> {
        let times: Vec<f64> = (1..=values.len()).map(|k| k as f64).collect();
        let obs: Vec<ObsVector<f64, 1>> =
            values.iter().map(|&y| ObsVector::from_array([y])).collect();
        MemoryObservations::new(times, obs).unwrap()
    }

    fn default_filter(count: usize) -> ParticleFilter<f64> {
        ParticleFilter::new(
            FilterConfig::new(count, 0.5, IntegratorConfig::default()).unwrap(),
        )
    }

    #[test]
    fn test_config_validation() {
        assert!(FilterConfig::new(0, 0.5_f64, IntegratorConfig::default()).is_err());
        assert!(FilterConfig::new(10, 0.0_f64, IntegratorConfig::default()).is_err());
        assert!(FilterConfig::new(10, 1.5_f64, IntegratorConfig::default()).is_err());
        assert!(FilterConfig::new(10, 1.0_f64, IntegratorConfig::default()).is_ok());
    }

    #[test]
    fn test_filter_produces_finite_likelihood() {
        let model = lg_model();
        let obs = observations(&[0.3, 0.1, -0.2, 0.4]);
        let root = RandomSource::new(42);
        let theta = ParamStorage::shared(ParamVector::from_array([0.5, 1.0]));
        let outcome = default_filter(256)
            .filter(
                &model,
                &root,
                10.0,
                &obs,
                None,
                &StratifiedResampler,
                theta,
                None,
                None,
            )
            .unwrap();
        assert_eq!(outcome.steps, 4);
        assert_eq!(outcome.ensemble.len(), 256);
        assert!(outcome.log_likelihood.is_finite());
    }

    #[test]
    fn test_filter_reproducible_with_seed() {
        let model = lg_model();
        let obs = observations(&[0.3, 0.1, -0.2, 0.4]);
        let theta = ParamVector::from_array([0.5, 1.0]);
        let run = |seed: u64| {
            default_filter(128)
                .filter(
                    &model,
                    &RandomSource::new(seed),
                    10.0,
                    &obs,
                    None,
                    &StratifiedResampler,
                    ParamStorage::shared(theta),
                    None,
                    None,
                )
                .unwrap()
                .log_likelihood
        };
        assert_eq!(run(7), run(7));
        assert!(run(7) != run(8));
    }

    #[test]
    fn test_horizon_truncates_observations() {
        let model = lg_model();
        let obs = observations(&[0.3, 0.1, -0.2, 0.4]);
        let root = RandomSource::new(1);
        let outcome = default_filter(64)
            .filter(
                &model,
                &root,
                2.0,
                &obs,
                None,
                &StratifiedResampler,
                ParamStorage::shared(ParamVector::from_array([0.5, 1.0])),
                None,
                None,
            )
            .unwrap();
        assert_eq!(outcome.steps, 2);
    }

    #[test]
    fn test_history_records_every_step() {
        let model = lg_model();
        let obs = observations(&[0.3, 0.1, -0.2]);
        let root = RandomSource::new(3);
        let mut history = FilterHistory::<f64, 1, 0>::new();
        default_filter(32)
            .filter(
                &model,
                &root,
                10.0,
                &obs,
                None,
                &StratifiedResampler,
                ParamStorage::shared(ParamVector::from_array([0.5, 1.0])),
                None,
                Some(&mut history),
            )
            .unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.particle_count(), 32);
        assert!((history.step(2).time - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_far_observation_does_not_collapse() {
        // An outlying observation shrinks all weights together; the
        // max-shift keeps the ensemble alive and the likelihood low.
        let model = lg_model();
        let obs = observations(&[50.0]);
        let root = RandomSource::new(5);
        let outcome = default_filter(64)
            .filter(
                &model,
                &root,
                10.0,
                &obs,
                None,
                &StratifiedResampler,
                ParamStorage::shared(ParamVector::from_array([0.5, 1.0])),
                None,
                None,
            )
            .unwrap();
        assert!(outcome.log_likelihood < -100.0);
        assert!(outcome.log_likelihood.is_finite());
    }

    // Minimal model exercising the collapsed-state log-density path: the
    // propagation contributes a constant to every particle's log-weight,
    // which must appear one-for-one in the likelihood estimate.
    struct CollapsedContribModel {
        contribution: f64,
    }

    impl StateSpaceModel<f64, 1, 1, 1, 1> for CollapsedContribModel {
        fn sample_dynamic_prior(&self, _rng: &mut RandomSource) -> DynVector<f64, 1> {
            DynVector::zeros()
        }

        fn sample_param_prior(&self, _rng: &mut RandomSource) -> ParamVector<f64, 1> {
            ParamVector::zeros()
        }

        fn log_param_prior(&self, _theta: &ParamVector<f64, 1>) -> f64 {
            0.0
        }

        fn param_prior_covariance(&self) -> crate::types::spaces::ParamCovariance<f64, 1> {
            crate::types::spaces::ParamCovariance::identity()
        }

        #[allow(clippy::too_many_arguments)]
        fn propagate(
            &self,
            _rng: &mut RandomSource,
            dynamic: &DynVector<f64, 1>,
            collapsed: &CollapsedVector<f64, 1>,
            _theta: &ParamVector<f64, 1>,
            _t0: f64,
            _t1: f64,
            _forcing: Option<&[f64]>,
            _integrator: &IntegratorConfig<f64>,
            _disturbance: Option<&DynVector<f64, 1>>,
        ) -> crate::Result<Propagated<f64, 1, 1>> {
            Ok(Propagated {
                dynamic: *dynamic,
                collapsed: *collapsed,
                log_density: self.contribution,
            })
        }

        fn log_observation_density(
            &self,
            _obs: &ObsVector<f64, 1>,
            _dynamic: &DynVector<f64, 1>,
            _collapsed: &CollapsedVector<f64, 1>,
            _theta: &ParamVector<f64, 1>,
        ) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_collapsed_log_density_enters_likelihood() {
        let model = CollapsedContribModel { contribution: -1.25 };
        let obs = observations(&[0.0, 0.0]);
        let root = RandomSource::new(11);
        let outcome = default_filter(16)
            .filter(
                &model,
                &root,
                10.0,
                &obs,
                None,
                &StratifiedResampler,
                ParamStorage::shared(ParamVector::zeros()),
                None,
                None,
            )
            .unwrap();
        // Two steps, each contributing exactly -1.25.
        assert!((outcome.log_likelihood + 2.5).abs() < 1e-10);
    }
}

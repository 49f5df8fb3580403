//! Particle marginal Metropolis-Hastings
//!
//! A Metropolis-Hastings chain over the static parameters in which every
//! likelihood evaluation is a fresh particle-filter run: a pseudo-marginal
//! sampler. The filter's estimate is unbiased, so the chain targets the
//! exact posterior despite the noise. The chain is strictly sequential:
//! step `n + 1` starts only after step `n`'s accept/reject decision and
//! any adaptation update are final.
//!
//! Rejected proposals re-emit the previous draw so the output has exactly
//! one row per step; a degenerate or integrator-failed inner filter run
//! counts as likelihood negative infinity (a rejected step), never as
//! chain death. Every `adaptation_interval` steps the proposal covariance
//! is refit to the transformed chain history, scaled by `sd = 2.4^2 / NP`
//! unless overridden; refits that lose positive definiteness keep the
//! previous proposal.

use nalgebra::{RealField, SMatrix};
use num_traits::Float;

use log::{debug, info, warn};

use crate::filters::particle::ParticleFilter;
use crate::io::{ForcingStream, McmcRecord, McmcSink, ObservationStream};
use crate::models::StateSpaceModel;
use crate::random::RandomSource;
use crate::resamplers::Resampler;
use crate::samplers::proposal::{empirical_covariance, GaussianProposal};
use crate::types::params::ParamStorage;
use crate::types::spaces::ParamVector;
use crate::{Result, SmcError};

/// Substream tag for chain-level draws (initial state, proposals, accepts).
const TAG_CHAIN: u64 = 0x2929_0001;
/// Substream tag base for the per-step inner filter runs.
const TAG_LIKELIHOOD: u64 = 0x2929_0002;

/// Covariance jitter keeping near-singular history fits factorizable.
const ADAPTATION_JITTER: f64 = 1.0e-9;

// ============================================================================
// Configuration
// ============================================================================

/// Chain configuration.
#[derive(Debug, Clone)]
pub struct McmcConfig<T: RealField> {
    /// Number of chain steps to take.
    pub chain_length: usize,
    /// Steps between proposal-covariance refits; zero disables adaptation.
    pub adaptation_interval: usize,
    /// Override of the dimension heuristic `sd = 2.4^2 / NP`.
    pub sd: Option<T>,
}

impl<T: RealField + Float + Copy> McmcConfig<T> {
    /// Creates a validated configuration.
    ///
    /// # Errors
    /// Returns [`SmcError::InvalidConfig`] for a zero chain length or a
    /// non-positive `sd` override.
    pub fn new(chain_length: usize, adaptation_interval: usize) -> Result<Self> {
        if chain_length == 0 {
            return Err(SmcError::InvalidConfig("chain length must be positive"));
        }
        Ok(Self {
            chain_length,
            adaptation_interval,
            sd: None,
        })
    }

    /// Overrides the adaptation scale factor.
    ///
    /// # Errors
    /// Returns [`SmcError::InvalidConfig`] for a non-positive value.
    pub fn with_sd(mut self, sd: T) -> Result<Self> {
        if sd <= T::zero() || !Float::is_finite(sd) {
            return Err(SmcError::InvalidConfig("sd must be positive"));
        }
        self.sd = Some(sd);
        Ok(self)
    }
}

/// Summary of a completed (or interrupted) chain.
#[derive(Debug, Clone)]
pub struct McmcOutcome<T: RealField, const NP: usize> {
    /// Accepted proposals.
    pub accepted: usize,
    /// Steps actually taken (smaller than the configured length only when
    /// interrupted).
    pub steps: usize,
    /// Parameter vector held at termination.
    pub final_params: ParamVector<T, NP>,
    /// Log-likelihood estimate attached to the final state.
    pub final_log_likelihood: T,
}

impl<T: RealField + Float + Copy, const NP: usize> McmcOutcome<T, NP> {
    /// Fraction of proposals accepted.
    pub fn acceptance_rate(&self) -> T {
        if self.steps == 0 {
            T::zero()
        } else {
            T::from(self.accepted).unwrap() / T::from(self.steps).unwrap()
        }
    }
}

// ============================================================================
// Sampler
// ============================================================================

/// Pseudo-marginal Metropolis-Hastings sampler over static parameters.
#[derive(Debug, Clone)]
pub struct ParticleMcmc<T: RealField> {
    config: McmcConfig<T>,
}

impl<T: RealField + Float + Copy + Send + Sync> ParticleMcmc<T> {
    /// Creates a sampler with the given configuration.
    pub fn new(config: McmcConfig<T>) -> Self {
        Self { config }
    }

    /// The sampler's configuration.
    pub fn config(&self) -> &McmcConfig<T> {
        &self.config
    }

    /// Runs the chain.
    ///
    /// `initial` seeds the chain; `None` samples the parameter prior.
    /// `should_stop` is polled between steps; the in-flight step always
    /// completes. One record is written to `sink` per step, rejected or
    /// not.
    ///
    /// # Errors
    /// Configuration and sink failures are fatal. Degenerate or
    /// integrator-failed inner filter runs are absorbed as rejected steps.
    #[allow(clippy::too_many_arguments)]
    pub fn sample<M, const ND: usize, const NC: usize, const NP: usize, const NY: usize>(
        &self,
        model: &M,
        root: &RandomSource,
        horizon: T,
        obs: &dyn ObservationStream<T, NY>,
        forcing: Option<&dyn ForcingStream<T>>,
        resampler: &dyn Resampler<T>,
        filter: &ParticleFilter<T>,
        proposal: &mut GaussianProposal<T, NP>,
        initial: Option<ParamVector<T, NP>>,
        sink: &mut dyn McmcSink<T, NP>,
        should_stop: Option<&dyn Fn() -> bool>,
    ) -> Result<McmcOutcome<T, NP>>
    where
        M: StateSpaceModel<T, ND, NC, NP, NY> + Sync,
    {
        let mut chain_rng = root.substream(TAG_CHAIN);

        // Initialize the chain state and its likelihood estimate.
        let mut theta = match initial {
            Some(theta) => theta,
            None => model.sample_param_prior(&mut chain_rng),
        };
        let mut z = proposal.to_transformed(&theta)?;
        let mut log_prior = model.log_param_prior(&theta);
        if !Float::is_finite(log_prior) {
            return Err(SmcError::InvalidConfig(
                "initial parameters lie outside the prior support",
            ));
        }
        let mut log_likelihood =
            estimate_log_likelihood(model, root, horizon, obs, forcing, resampler, filter, &theta, 0)?;
        info!(
            "pmcmc: {} steps, initial log-likelihood {:?}",
            self.config.chain_length, log_likelihood
        );

        let sd = self
            .config
            .sd
            .unwrap_or_else(|| T::from(2.4 * 2.4).unwrap() / T::from(NP).unwrap());

        let mut history: Vec<ParamVector<T, NP>> = Vec::new();
        let mut accepted = 0usize;
        let mut steps = 0usize;

        for step in 0..self.config.chain_length {
            if let Some(stop) = should_stop {
                if stop() {
                    info!("pmcmc: interrupted after {} steps", steps);
                    break;
                }
            }

            // Propose in transformed coordinates.
            let z_prop = proposal.propose(&mut chain_rng, &z);
            let theta_prop = proposal.from_transformed(&z_prop);
            let log_prior_prop = model.log_param_prior(&theta_prop);

            // A proposal outside the prior support is rejected without
            // paying for a filter run.
            let mut accept = false;
            if Float::is_finite(log_prior_prop) {
                let log_likelihood_prop = estimate_log_likelihood(
                    model,
                    root,
                    horizon,
                    obs,
                    forcing,
                    resampler,
                    filter,
                    &theta_prop,
                    step as u64 + 1,
                )?;
                let target_prop =
                    log_likelihood_prop + log_prior_prop + proposal.log_jacobian(&z_prop);
                let target_curr = log_likelihood + log_prior + proposal.log_jacobian(&z);
                if Float::is_finite(target_prop) {
                    accept = if !Float::is_finite(target_curr) {
                        // Escaping an impossible current state.
                        true
                    } else {
                        let log_ratio = target_prop - target_curr;
                        let u: T = chain_rng.uniform();
                        Float::ln(u) < log_ratio
                    };
                }
                if accept {
                    theta = theta_prop;
                    z = z_prop;
                    log_prior = log_prior_prop;
                    log_likelihood = log_likelihood_prop;
                    accepted += 1;
                }
            }

            steps += 1;

            // One row per step: re-emit the previous draw on rejection.
            sink.record_draw(&McmcRecord {
                step,
                params: theta,
                log_likelihood,
                log_prior,
                accepted: accept,
            })?;

            // Diminishing adaptation: refit on the whole transformed
            // history at a fixed cadence.
            history.push(z);
            if self.config.adaptation_interval > 0
                && (step + 1) % self.config.adaptation_interval == 0
                && history.len() > NP + 1
            {
                if let Some(mut covariance) = empirical_covariance(&history) {
                    let jitter = T::from(ADAPTATION_JITTER).unwrap();
                    covariance = covariance * sd + SMatrix::<T, NP, NP>::identity() * jitter;
                    match proposal.set_covariance(&covariance) {
                        Ok(()) => debug!(
                            "pmcmc: adapted proposal at step {} (acceptance {} / {})",
                            step, accepted, steps
                        ),
                        Err(_) => warn!(
                            "pmcmc: adapted covariance not positive definite, keeping previous"
                        ),
                    }
                }
            }
        }

        info!("pmcmc: {} of {} proposals accepted", accepted, steps);
        Ok(McmcOutcome {
            accepted,
            steps,
            final_params: theta,
            final_log_likelihood: log_likelihood,
        })
    }
}

/// Runs one inner particle filter and maps statistical failures to
/// negative infinity (a rejected step), leaving hard failures fatal.
#[allow(clippy::too_many_arguments)]
fn estimate_log_likelihood<T, M, const ND: usize, const NC: usize, const NP: usize, const NY: usize>(
    model: &M,
    root: &RandomSource,
    horizon: T,
    obs: &dyn ObservationStream<T, NY>,
    forcing: Option<&dyn ForcingStream<T>>,
    resampler: &dyn Resampler<T>,
    filter: &ParticleFilter<T>,
    theta: &ParamVector<T, NP>,
    step: u64,
) -> Result<T>
where
    T: RealField + Float + Copy + Send + Sync,
    M: StateSpaceModel<T, ND, NC, NP, NY> + Sync,
{
    // Fresh estimator randomness per chain step; the estimator noise is
    // part of the pseudo-marginal construction.
    let filter_root = root.substream(TAG_LIKELIHOOD).substream(step);
    match filter.filter(
        model,
        &filter_root,
        horizon,
        obs,
        forcing,
        resampler,
        ParamStorage::shared(*theta),
        None,
        None,
    ) {
        Ok(outcome) => Ok(outcome.log_likelihood),
        Err(SmcError::Degeneracy) | Err(SmcError::IntegratorFailure) => {
            debug!("pmcmc: inner filter failed statistically, rejecting step");
            Ok(T::neg_infinity())
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::particle::FilterConfig;
    use crate::io::{MemoryMcmcBuffer, MemoryObservations};
    use crate::models::{IntegratorConfig, LinearGaussianModel};
    use crate::resamplers::StratifiedResampler;
    use crate::types::spaces::ObsVector;

    fn setup() -> (LinearGaussianModel<f64>, MemoryObservations<f64, 1>) {
        let model = LinearGaussianModel::new(0.0, 0.5, 0.0, 1.0, 0.5, 0.4, 1.0, 0.4).unwrap();
        let values = [0.3, -0.1, 0.4, 0.2];
        let times: Vec<f64> = (1..=values.len()).map(|k| k as f64).collect();
        let obs = MemoryObservations::new(
            times,
            values.iter().map(|&y| ObsVector::from_array([y])).collect(),
        )
        .unwrap();
        (model, obs)
    }

    fn run_chain(
        chain_length: usize,
        proposal_scale: f64,
        seed: u64,
    ) -> (McmcOutcome<f64, 2>, MemoryMcmcBuffer<f64, 2>) {
        let (model, obs) = setup();
        let filter = ParticleFilter::new(
            FilterConfig::new(64, 0.5, IntegratorConfig::default()).unwrap(),
        );
        let mut proposal = GaussianProposal::from_prior_covariance(
            model.param_prior_covariance(),
            model.param_log_mask(),
            proposal_scale,
        )
        .unwrap();
        let sampler = ParticleMcmc::new(McmcConfig::new(chain_length, 0).unwrap());
        let mut buffer = MemoryMcmcBuffer::new();
        let outcome = sampler
            .sample(
                &model,
                &RandomSource::new(seed),
                10.0,
                &obs,
                None,
                &StratifiedResampler,
                &filter,
                &mut proposal,
                None,
                &mut buffer,
                None,
            )
            .unwrap();
        (outcome, buffer)
    }

    #[test]
    fn test_config_validation() {
        assert!(McmcConfig::<f64>::new(0, 10).is_err());
        assert!(McmcConfig::<f64>::new(10, 0).is_ok());
        assert!(McmcConfig::<f64>::new(10, 5).unwrap().with_sd(0.0).is_err());
    }

    #[test]
    fn test_one_record_per_step() {
        let (outcome, buffer) = run_chain(25, 0.05, 3);
        assert_eq!(outcome.steps, 25);
        assert_eq!(buffer.records().len(), 25);
        for (k, record) in buffer.records().iter().enumerate() {
            assert_eq!(record.step, k);
            assert!(*record.params.index(0) > 0.0);
            assert!(*record.params.index(1) > 0.0);
        }
    }

    #[test]
    fn test_rejected_steps_re_emit_previous_draw() {
        let (_, buffer) = run_chain(40, 0.4, 5);
        let records = buffer.records();
        let mut saw_rejection = false;
        for pair in records.windows(2) {
            if !pair[1].accepted {
                saw_rejection = true;
                assert_eq!(pair[1].params.as_slice(), pair[0].params.as_slice());
                assert_eq!(pair[1].log_likelihood, pair[0].log_likelihood);
            }
        }
        assert!(saw_rejection, "expected at least one rejection in 40 steps");
    }

    #[test]
    fn test_chain_reproducible_with_seed() {
        let (a, _) = run_chain(15, 0.05, 9);
        let (b, _) = run_chain(15, 0.05, 9);
        assert_eq!(a.accepted, b.accepted);
        assert_eq!(a.final_params.as_slice(), b.final_params.as_slice());
        assert_eq!(a.final_log_likelihood, b.final_log_likelihood);
    }

    #[test]
    fn test_interruption_completes_in_flight_step() {
        let (model, obs) = setup();
        let filter = ParticleFilter::new(
            FilterConfig::new(32, 0.5, IntegratorConfig::default()).unwrap(),
        );
        let mut proposal = GaussianProposal::from_prior_covariance(
            model.param_prior_covariance(),
            model.param_log_mask(),
            0.05,
        )
        .unwrap();
        let sampler = ParticleMcmc::new(McmcConfig::new(1000, 0).unwrap());
        let mut buffer = MemoryMcmcBuffer::new();
        let counter = std::cell::Cell::new(0usize);
        let stop = || {
            counter.set(counter.get() + 1);
            counter.get() > 5
        };
        let outcome = sampler
            .sample(
                &model,
                &RandomSource::new(13),
                10.0,
                &obs,
                None,
                &StratifiedResampler,
                &filter,
                &mut proposal,
                None,
                &mut buffer,
                Some(&stop),
            )
            .unwrap();
        assert_eq!(outcome.steps, 5);
        assert_eq!(buffer.records().len(), 5);
    }

    #[test]
    fn test_adaptation_changes_proposal() {
        let (model, obs) = setup();
        let filter = ParticleFilter::new(
            FilterConfig::new(32, 0.5, IntegratorConfig::default()).unwrap(),
        );
        let mut proposal = GaussianProposal::from_prior_covariance(
            model.param_prior_covariance(),
            model.param_log_mask(),
            0.5,
        )
        .unwrap();
        let before = *proposal.covariance().as_matrix();
        let sampler = ParticleMcmc::new(McmcConfig::new(30, 10).unwrap());
        let mut buffer = MemoryMcmcBuffer::new();
        sampler
            .sample(
                &model,
                &RandomSource::new(17),
                10.0,
                &obs,
                None,
                &StratifiedResampler,
                &filter,
                &mut proposal,
                None,
                &mut buffer,
                None,
            )
            .unwrap();
        let after = *proposal.covariance().as_matrix();
        assert!(
            (0..2).any(|i| (0..2).any(|j| (before[(i, j)] - after[(i, j)]).abs() > 1e-12)),
            "adaptation left the proposal covariance untouched"
        );
    }
}

//! Example usage of the SMC-RS library
//!
//! Simulates a scalar linear-Gaussian model, filters it, infers the
//! static parameters with particle MCMC, and reconstructs the smoothed
//! trajectory.

use smcrs::filters::particle::{FilterConfig, ParticleFilter};
use smcrs::io::{MemoryMcmcBuffer, MemoryObservations, MemorySmootherBuffer};
use smcrs::models::{IntegratorConfig, LinearGaussianModel, StateSpaceModel};
use smcrs::prelude::*;
use smcrs::resamplers::StratifiedResampler;
use smcrs::samplers::{GaussianProposal, McmcConfig, ParticleMcmc};
use smcrs::smoothers::{GaussianKernel, KernelForwardBackwardSmoother, MedianPartitioner};
use smcrs::types::trajectory::FilterHistory;

fn main() {
    env_logger::init();

    println!("SMC-RS: Sequential Monte Carlo Inference");
    println!("========================================\n");

    // Model: mean-reverting latent state observed in Gaussian noise.
    let model = LinearGaussianModel::new(
        0.0, // long-run mean
        0.4, // observation noise std
        0.0, // initial mean
        1.0, // initial std
        0.5, // prior median of lambda
        0.4, // prior log-std of lambda
        1.0, // prior median of sigma
        0.4, // prior log-std of sigma
    )
    .expect("model configuration");

    let true_theta = ParamVector::from_array([0.5, 1.0]);
    let seed = 42;
    let root = RandomSource::new(seed);
    let integrator = IntegratorConfig::default();

    // Simulate a synthetic data set from the true parameters.
    let horizon = 20.0;
    let mut sim_rng = root.substream(0xdead);
    let mut truth = Vec::new();
    let mut observations = Vec::new();
    let mut x = model.sample_dynamic_prior(&mut sim_rng);
    for k in 1..=20 {
        let out = model
            .propagate(
                &mut sim_rng,
                &x,
                &CollapsedVector::zeros(),
                &true_theta,
                (k - 1) as f64,
                k as f64,
                None,
                &integrator,
                None,
            )
            .expect("simulation step");
        x = out.dynamic;
        truth.push(*x.index(0));
        observations.push(ObsVector::from_array([
            *x.index(0) + 0.4 * sim_rng.standard_normal::<f64>(),
        ]));
    }
    let times: Vec<f64> = (1..=20).map(|k| k as f64).collect();
    let obs = MemoryObservations::new(times, observations).expect("observation stream");
    println!("Simulated {} observations to t = {}\n", truth.len(), horizon);

    // Filter with a recorded history.
    let particle_count = 2048;
    let filter = ParticleFilter::new(
        FilterConfig::new(particle_count, 0.5, integrator).expect("filter configuration"),
    );
    let mut history = FilterHistory::new();
    let timer = Stopwatch::start();
    let outcome = filter
        .filter(
            &model,
            &root,
            horizon,
            &obs,
            None,
            &StratifiedResampler,
            ParamStorage::shared(true_theta),
            None,
            Some(&mut history),
        )
        .expect("filtering run");
    println!(
        "Filter:   log-likelihood {:.3} with {} particles, {} resampling events ({:.3} s)",
        outcome.log_likelihood,
        particle_count,
        outcome.resample_count,
        timer.elapsed_secs()
    );

    // Infer the parameters with particle MCMC.
    let chain_length = 200;
    let inner_filter = ParticleFilter::new(
        FilterConfig::new(256, 0.5, integrator).expect("filter configuration"),
    );
    let mut proposal = GaussianProposal::from_prior_covariance(
        model.param_prior_covariance(),
        model.param_log_mask(),
        0.1,
    )
    .expect("proposal construction");
    let sampler = ParticleMcmc::new(
        McmcConfig::new(chain_length, 50).expect("chain configuration"),
    );
    let mut chain = MemoryMcmcBuffer::new();
    let timer = Stopwatch::start();
    let mcmc = sampler
        .sample(
            &model,
            &root,
            horizon,
            &obs,
            None,
            &StratifiedResampler,
            &inner_filter,
            &mut proposal,
            None,
            &mut chain,
            None,
        )
        .expect("pmcmc run");
    println!(
        "PMCMC:    {} of {} proposals accepted, final theta = ({:.3}, {:.3}) ({:.3} s)",
        mcmc.accepted,
        mcmc.steps,
        mcmc.final_params.index(0),
        mcmc.final_params.index(1),
        timer.elapsed_secs()
    );

    // Smooth the recorded filtering pass.
    let smoother = KernelForwardBackwardSmoother::new(
        GaussianKernel::rule_of_thumb(1, particle_count).expect("kernel"),
        MedianPartitioner::default(),
        integrator,
    );
    let mut smoothed = MemorySmootherBuffer::new();
    let timer = Stopwatch::start();
    smoother
        .smooth(
            &model,
            &root,
            &history,
            &ParamStorage::shared(true_theta),
            None,
            &mut smoothed,
        )
        .expect("smoothing pass");
    println!(
        "Smoother: {} steps reconstructed ({:.3} s)\n",
        smoothed.records().len(),
        timer.elapsed_secs()
    );

    println!("   t    truth    smoothed (variance)");
    for (record, x) in smoothed.records().iter().zip(&truth) {
        println!(
            "{:5.1}  {:7.3}  {:9.3} ({:.4})",
            record.time,
            x,
            record.mean.index(0),
            record.variance.index(0)
        );
    }
}

//! Common test helpers for the inference integration tests

#![allow(dead_code)]

use smcrs::models::{IntegratorConfig, LinearGaussianModel, StateSpaceModel};
use smcrs::io::MemoryObservations;
use smcrs::random::RandomSource;
use smcrs::types::spaces::{CollapsedVector, ObsVector, ParamVector};

/// True parameters used by the synthetic linear-Gaussian data sets.
pub const TRUE_LAMBDA: f64 = 0.5;
pub const TRUE_SIGMA: f64 = 1.0;
pub const OBS_STD: f64 = 0.4;

/// Builds the standard benchmark model.
pub fn lg_model() -> LinearGaussianModel<f64> {
    LinearGaussianModel::new(0.0, OBS_STD, 0.0, 1.0, TRUE_LAMBDA, 0.4, TRUE_SIGMA, 0.4).unwrap()
}

/// The benchmark parameter vector.
pub fn true_theta() -> ParamVector<f64, 2> {
    ParamVector::from_array([TRUE_LAMBDA, TRUE_SIGMA])
}

/// Simulates a trajectory and unit-spaced noisy observations from the
/// benchmark model. Returns (latent states, observation stream).
pub fn simulate_lg_data(
    model: &LinearGaussianModel<f64>,
    steps: usize,
    seed: u64,
) -> (Vec<f64>, MemoryObservations<f64, 1>) {
    let mut rng = RandomSource::new(seed);
    let theta = true_theta();
    let mut x = model.sample_dynamic_prior(&mut rng);
    let mut truth = Vec::with_capacity(steps);
    let mut values = Vec::with_capacity(steps);
    for k in 1..=steps {
        let out = model
            .propagate(
                &mut rng,
                &x,
                &CollapsedVector::zeros(),
                &theta,
                (k - 1) as f64,
                k as f64,
                None,
                &IntegratorConfig::default(),
                None,
            )
            .unwrap();
        x = out.dynamic;
        truth.push(*x.index(0));
        values.push(ObsVector::from_array([
            *x.index(0) + OBS_STD * rng.standard_normal::<f64>(),
        ]));
    }
    let times: Vec<f64> = (1..=steps).map(|k| k as f64).collect();
    (truth, MemoryObservations::new(times, values).unwrap())
}

/// One Kalman-filtered moment pair per observation time.
#[derive(Debug, Clone, Copy)]
pub struct KalmanMoments {
    pub mean: f64,
    pub variance: f64,
}

/// Closed-form Kalman filter for the benchmark model over unit-spaced
/// observations: the exact posterior the particle filter is checked
/// against.
pub fn kalman_reference(
    model: &LinearGaussianModel<f64>,
    observations: &[f64],
) -> Vec<KalmanMoments> {
    let (phi, noise_std) = model.transition_coefficients(TRUE_LAMBDA, TRUE_SIGMA, 1.0);
    let q = noise_std * noise_std;
    let r = OBS_STD * OBS_STD;

    let mut mean = 0.0_f64; // init_mean
    let mut var = 1.0_f64; // init_std^2
    let mut moments = Vec::with_capacity(observations.len());
    for &y in observations {
        // Predict.
        mean *= phi;
        var = phi * phi * var + q;
        // Update.
        let innovation_var = var + r;
        let gain = var / innovation_var;
        mean += gain * (y - mean);
        var *= 1.0 - gain;
        moments.push(KalmanMoments {
            mean,
            variance: var,
        });
    }
    moments
}

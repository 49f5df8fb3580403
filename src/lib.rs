//! SMC-RS: Sequential Monte Carlo Inference Library for Rust
//!
//! Bayesian inference for continuous-time stochastic state-space models:
//! given noisy, irregularly-sampled observations and a model of the latent
//! dynamics, estimate latent trajectories and static parameters.
//!
//! # Features
//!
//! - **Particle filtering**: bootstrap, auxiliary and disturbance variants
//!   with pluggable resampling strategies
//! - **Particle MCMC**: pseudo-marginal Metropolis-Hastings over static
//!   parameters with adaptive proposals
//! - **Kernel smoothing**: forward-backward trajectory reconstruction with
//!   partition-bounded kernel sums
//! - **Type Safety**: state partitions (dynamic, collapsed, parameter) and
//!   their dimensions encoded in the type system
//! - **Reproducibility**: one root seed, deterministic substreams per
//!   particle regardless of thread scheduling

pub mod types;
pub mod models;
pub mod random;
pub mod resamplers;
pub mod filters;
pub mod samplers;
pub mod smoothers;
pub mod sim;
pub mod io;
pub mod utils;

pub mod prelude {
    pub use crate::types::spaces::*;
    pub use crate::types::ensemble::*;
    pub use crate::types::params::*;
    pub use crate::types::trajectory::*;
    pub use crate::models::*;
    pub use crate::random::RandomSource;
    pub use crate::resamplers::{Resampler, ResamplerKind};
    pub use crate::filters::particle::*;
    pub use crate::utils::*;
}

/// Error types for the library
#[derive(Debug, Clone, PartialEq)]
pub enum SmcError {
    /// Ensemble weights are all zero or contain non-finite values
    Degeneracy,
    /// Proposal covariance is not positive definite
    NotPositiveDefinite,
    /// Invalid configuration detected before any computation
    InvalidConfig(&'static str),
    /// Resampler name does not match a known strategy
    UnknownResampler,
    /// Trajectory integrator failed to advance a particle
    IntegratorFailure,
    /// A required input source or output sink failed
    Io(String),
}

impl std::error::Error for SmcError {}

impl ::core::fmt::Display for SmcError {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        match self {
            SmcError::Degeneracy => {
                write!(
                    f,
                    "Particle ensemble degenerate: weights sum to zero or are non-finite"
                )
            }
            SmcError::NotPositiveDefinite => {
                write!(f, "Covariance matrix is not positive definite")
            }
            SmcError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            SmcError::UnknownResampler => write!(f, "Unknown resampler name"),
            SmcError::IntegratorFailure => write!(f, "Trajectory integrator failure"),
            SmcError::Io(msg) => write!(f, "I/O failure: {}", msg),
        }
    }
}

pub type Result<T> = ::core::result::Result<T, SmcError>;

//! Parameter samplers
//!
//! Pseudo-marginal Markov chain Monte Carlo over the static parameter
//! partition, with the particle filter as the (noisy, unbiased)
//! likelihood oracle and an adaptive Gaussian random-walk proposal.

pub mod proposal;
pub mod pmcmc;

pub use pmcmc::{McmcConfig, McmcOutcome, ParticleMcmc};
pub use proposal::GaussianProposal;

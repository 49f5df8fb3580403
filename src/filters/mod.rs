//! Particle filters
//!
//! One state-machine skeleton (initialize, propagate, weight, resample,
//! accumulate likelihood, terminate) shared by three variants that differ
//! only in how particles are weighted and propagated:
//!
//! - [`particle::ParticleFilter`]: the bootstrap filter (default)
//! - [`auxiliary::AuxiliaryParticleFilter`]: look-ahead first-stage
//!   weighting before propagation
//! - [`disturbance::DisturbanceParticleFilter`]: filter-drawn disturbance
//!   noise with a configurable scale

pub mod particle;
pub mod auxiliary;
pub mod disturbance;

pub use auxiliary::AuxiliaryParticleFilter;
pub use disturbance::DisturbanceParticleFilter;
pub use particle::{FilterConfig, FilterOutcome, ParticleFilter};

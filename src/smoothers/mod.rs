//! Kernel forward-backward smoothing
//!
//! Post-processes a recorded filtering pass into smoothed marginals: a
//! backward sweep reweights each step's particles by kernel-weighted
//! agreement with the (already smoothed) next step, using a median
//! partition of the ensemble to bound the pairwise kernel cost.

pub mod kernel;
pub mod partition;
pub mod kernel_fb;

pub use kernel::GaussianKernel;
pub use kernel_fb::{KernelForwardBackwardSmoother, SmootherOutcome};
pub use partition::MedianPartitioner;

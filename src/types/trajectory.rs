//! Recorded filtering trajectories
//!
//! The particle filter can record a per-step snapshot of every particle's
//! state partitions, weight and ancestor index. The accumulated
//! [`FilterHistory`] is the forward-pass input consumed (read-only) by the
//! kernel forward-backward smoother, and doubles as the in-memory
//! filtering output buffer.

use nalgebra::RealField;
use num_traits::Float;

use crate::types::ensemble::Ensemble;
use crate::types::spaces::{CollapsedVector, DynVector};

/// One time step's snapshot of the full ensemble.
#[derive(Debug, Clone)]
pub struct TrajectoryStep<T: RealField, const ND: usize, const NC: usize> {
    /// Observation time of this step.
    pub time: T,
    /// Dynamic state of every particle, pre-resampling.
    pub dynamic: Vec<DynVector<T, ND>>,
    /// Collapsed state of every particle, pre-resampling.
    pub collapsed: Vec<CollapsedVector<T, NC>>,
    /// Unnormalized post-weighting weights.
    pub weights: Vec<T>,
    /// Ancestor of each particle in the previous step's snapshot.
    pub ancestors: Vec<usize>,
}

/// The full per-step record of one filtering run.
#[derive(Debug, Clone, Default)]
pub struct FilterHistory<T: RealField, const ND: usize, const NC: usize> {
    steps: Vec<TrajectoryStep<T, ND, NC>>,
}

impl<T: RealField + Float + Copy, const ND: usize, const NC: usize> FilterHistory<T, ND, NC> {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Number of recorded steps.
    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when nothing has been recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Recorded steps in time order.
    #[inline]
    pub fn steps(&self) -> &[TrajectoryStep<T, ND, NC>] {
        &self.steps
    }

    /// Snapshot accessor.
    #[inline]
    pub fn step(&self, index: usize) -> &TrajectoryStep<T, ND, NC> {
        &self.steps[index]
    }

    /// Particle count of the recorded run, zero when empty.
    pub fn particle_count(&self) -> usize {
        self.steps.first().map_or(0, |s| s.dynamic.len())
    }

    /// Appends a snapshot of `ensemble` at `time`, with `ancestors` linking
    /// it to the previously recorded step.
    pub fn record(&mut self, time: T, ensemble: &Ensemble<T, ND, NC>, ancestors: &[usize]) {
        debug_assert_eq!(ancestors.len(), ensemble.len());
        self.steps.push(TrajectoryStep {
            time,
            dynamic: ensemble.dynamic().to_vec(),
            collapsed: ensemble.collapsed().to_vec(),
            weights: ensemble.weights().to_vec(),
            ancestors: ancestors.to_vec(),
        });
    }

    /// Copies the last `lag` recorded steps into a new history, bounding
    /// the extent a smoothing pass works over. A `lag` of zero or more
    /// than the recorded length keeps everything.
    pub fn last_steps(&self, lag: usize) -> Self {
        if lag == 0 || lag >= self.steps.len() {
            return self.clone();
        }
        Self {
            steps: self.steps[self.steps.len() - lag..].to_vec(),
        }
    }

    /// Traces one final-step particle back through the ancestry, returning
    /// its dynamic-state path in time order.
    ///
    /// # Panics
    /// Panics if `particle` is out of bounds or the history is empty.
    pub fn ancestral_path(&self, particle: usize) -> Vec<DynVector<T, ND>> {
        let mut path = Vec::with_capacity(self.steps.len());
        let mut index = particle;
        for step in self.steps.iter().rev() {
            path.push(step.dynamic[index]);
            index = step.ancestors[index];
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::spaces::CollapsedVector;

    fn snapshot(history: &mut FilterHistory<f64, 1, 0>, time: f64, xs: &[f64], anc: &[usize]) {
        let mut e = Ensemble::<f64, 1, 0>::new(xs.len()).unwrap();
        for (i, &x) in xs.iter().enumerate() {
            e.set_state(i, DynVector::from_array([x]), CollapsedVector::zeros());
        }
        history.record(time, &e, anc);
    }

    #[test]
    fn test_record_and_access() {
        let mut h = FilterHistory::<f64, 1, 0>::new();
        assert!(h.is_empty());
        snapshot(&mut h, 0.0, &[1.0, 2.0], &[0, 1]);
        snapshot(&mut h, 1.0, &[3.0, 4.0], &[1, 1]);
        assert_eq!(h.len(), 2);
        assert_eq!(h.particle_count(), 2);
        assert!((h.step(1).time - 1.0).abs() < 1e-12);
        assert!((h.step(1).dynamic[0].index(0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_last_steps_window() {
        let mut h = FilterHistory::<f64, 1, 0>::new();
        for k in 0..5 {
            snapshot(&mut h, k as f64, &[k as f64], &[0]);
        }
        let window = h.last_steps(2);
        assert_eq!(window.len(), 2);
        assert!((window.step(0).time - 3.0).abs() < 1e-12);
        assert_eq!(h.last_steps(0).len(), 5);
        assert_eq!(h.last_steps(99).len(), 5);
    }

    #[test]
    fn test_ancestral_path() {
        let mut h = FilterHistory::<f64, 1, 0>::new();
        snapshot(&mut h, 0.0, &[10.0, 20.0], &[0, 1]);
        // Step 1: particle 0 descends from old particle 1.
        snapshot(&mut h, 1.0, &[11.0, 21.0], &[1, 1]);
        let path = h.ancestral_path(0);
        assert_eq!(path.len(), 2);
        assert!((path[0].index(0) - 20.0).abs() < 1e-12);
        assert!((path[1].index(0) - 11.0).abs() < 1e-12);
    }
}

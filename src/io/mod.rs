//! Input sources and output sinks
//!
//! The inference engine reads observations, forcing inputs, initial
//! conditions and proposal bootstraps through narrow traits, and writes
//! filter, chain and smoother output through sink traits. In-memory
//! implementations cover the common case; JSON-lines writers persist
//! chain and smoother records for external analysis. Required sinks fail
//! hard ([`SmcError::Io`]); there is no silent best-effort path for data
//! the run is asked to produce.

use nalgebra::RealField;
use num_traits::Float;
use serde::Serialize;

use std::io::Write;

use crate::types::ensemble::Ensemble;
use crate::types::spaces::{
    CollapsedVector, DynVector, ObsVector, ParamCovariance, ParamVector,
};
use crate::types::trajectory::FilterHistory;
use crate::{Result, SmcError};

// ============================================================================
// Input Sources
// ============================================================================

/// A sparse, irregularly-timed observation stream.
pub trait ObservationStream<T: RealField, const NY: usize> {
    /// Number of observation times in the stream.
    fn len(&self) -> usize;

    /// True when the stream holds no observations.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Observation time at `index` (strictly increasing in `index`).
    fn time(&self, index: usize) -> T;

    /// Observation value at `index`.
    fn value(&self, index: usize) -> &ObsVector<T, NY>;

    /// Number of observation times at or before `horizon`.
    fn count_unique_times(&self, horizon: T) -> usize;
}

/// In-memory observation stream.
#[derive(Debug, Clone)]
pub struct MemoryObservations<T: RealField, const NY: usize> {
    times: Vec<T>,
    values: Vec<ObsVector<T, NY>>,
}

impl<T: RealField + Float + Copy, const NY: usize> MemoryObservations<T, NY> {
    /// Creates a stream from matched time/value vectors.
    ///
    /// # Errors
    /// Returns [`SmcError::InvalidConfig`] when the lengths differ or the
    /// times are not strictly increasing and finite.
    pub fn new(times: Vec<T>, values: Vec<ObsVector<T, NY>>) -> Result<Self> {
        if times.len() != values.len() {
            return Err(SmcError::InvalidConfig(
                "observation times and values must have equal length",
            ));
        }
        for window in times.windows(2) {
            if window[1] <= window[0] {
                return Err(SmcError::InvalidConfig(
                    "observation times must be strictly increasing",
                ));
            }
        }
        if times.iter().any(|t| !Float::is_finite(*t)) {
            return Err(SmcError::InvalidConfig("observation times must be finite"));
        }
        Ok(Self { times, values })
    }
}

impl<T: RealField + Float + Copy, const NY: usize> ObservationStream<T, NY>
    for MemoryObservations<T, NY>
{
    fn len(&self) -> usize {
        self.times.len()
    }

    fn time(&self, index: usize) -> T {
        self.times[index]
    }

    fn value(&self, index: usize) -> &ObsVector<T, NY> {
        &self.values[index]
    }

    fn count_unique_times(&self, horizon: T) -> usize {
        self.times.partition_point(|&t| t <= horizon)
    }
}

/// Sparse forcing inputs, valid piecewise from each listed time.
pub trait ForcingStream<T: RealField> {
    /// Forcing vector in effect at time `t`, if any input has started.
    fn at(&self, t: T) -> Option<&[T]>;
}

/// In-memory piecewise-constant forcing stream.
#[derive(Debug, Clone)]
pub struct MemoryForcing<T: RealField> {
    times: Vec<T>,
    values: Vec<Vec<T>>,
}

impl<T: RealField + Float + Copy> MemoryForcing<T> {
    /// Creates a forcing stream from matched time/value vectors.
    ///
    /// # Errors
    /// Returns [`SmcError::InvalidConfig`] when the lengths differ or the
    /// times are not strictly increasing.
    pub fn new(times: Vec<T>, values: Vec<Vec<T>>) -> Result<Self> {
        if times.len() != values.len() {
            return Err(SmcError::InvalidConfig(
                "forcing times and values must have equal length",
            ));
        }
        for window in times.windows(2) {
            if window[1] <= window[0] {
                return Err(SmcError::InvalidConfig(
                    "forcing times must be strictly increasing",
                ));
            }
        }
        Ok(Self { times, values })
    }
}

impl<T: RealField + Float + Copy> ForcingStream<T> for MemoryForcing<T> {
    fn at(&self, t: T) -> Option<&[T]> {
        let idx = self.times.partition_point(|&s| s <= t);
        if idx == 0 {
            None
        } else {
            Some(&self.values[idx - 1])
        }
    }
}

/// Supplies per-partition starting values in place of prior sampling.
pub trait InitSource<
    T: RealField,
    const ND: usize,
    const NC: usize,
    const NP: usize,
>
{
    /// Initial dynamic state for `particle`, `None` to sample the prior.
    fn dynamic(&self, particle: usize) -> Option<DynVector<T, ND>>;

    /// Initial collapsed state for `particle`, `None` to sample the prior.
    fn collapsed(&self, particle: usize) -> Option<CollapsedVector<T, NC>>;

    /// Initial parameter vector, `None` to sample the prior.
    fn params(&self) -> Option<ParamVector<T, NP>>;
}

/// In-memory initial-condition source broadcasting fixed values.
#[derive(Debug, Clone, Default)]
pub struct MemoryInit<T: RealField, const ND: usize, const NC: usize, const NP: usize> {
    /// Dynamic starting state shared by every particle, if fixed.
    pub dynamic: Option<DynVector<T, ND>>,
    /// Collapsed starting state shared by every particle, if fixed.
    pub collapsed: Option<CollapsedVector<T, NC>>,
    /// Parameter starting vector, if fixed.
    pub params: Option<ParamVector<T, NP>>,
}

impl<T: RealField + Copy, const ND: usize, const NC: usize, const NP: usize>
    InitSource<T, ND, NC, NP> for MemoryInit<T, ND, NC, NP>
{
    fn dynamic(&self, _particle: usize) -> Option<DynVector<T, ND>> {
        self.dynamic
    }

    fn collapsed(&self, _particle: usize) -> Option<CollapsedVector<T, NC>> {
        self.collapsed
    }

    fn params(&self) -> Option<ParamVector<T, NP>> {
        self.params
    }
}

/// Mean/covariance pair bootstrapping the MCMC proposal from a prior
/// smoothing run.
pub trait ProposalSource<T: RealField, const NP: usize> {
    /// Posterior mean in proposal (transformed) coordinates.
    fn mean(&self) -> ParamVector<T, NP>;

    /// Posterior covariance in proposal (transformed) coordinates.
    fn covariance(&self) -> ParamCovariance<T, NP>;
}

/// In-memory proposal bootstrap.
#[derive(Debug, Clone)]
pub struct MemoryProposal<T: RealField, const NP: usize> {
    /// Posterior mean.
    pub mean: ParamVector<T, NP>,
    /// Posterior covariance.
    pub covariance: ParamCovariance<T, NP>,
}

impl<T: RealField + Copy, const NP: usize> ProposalSource<T, NP> for MemoryProposal<T, NP> {
    fn mean(&self) -> ParamVector<T, NP> {
        self.mean
    }

    fn covariance(&self) -> ParamCovariance<T, NP> {
        self.covariance.clone()
    }
}

// ============================================================================
// Output Sinks
// ============================================================================

/// Receives per-step filtering output.
pub trait FilterSink<T: RealField, const ND: usize, const NC: usize> {
    /// Records one step's ensemble snapshot and ancestry.
    fn record_step(
        &mut self,
        time: T,
        ensemble: &Ensemble<T, ND, NC>,
        ancestors: &[usize],
    ) -> Result<()>;
}

impl<T: RealField + Float + Copy, const ND: usize, const NC: usize> FilterSink<T, ND, NC>
    for FilterHistory<T, ND, NC>
{
    fn record_step(
        &mut self,
        time: T,
        ensemble: &Ensemble<T, ND, NC>,
        ancestors: &[usize],
    ) -> Result<()> {
        self.record(time, ensemble, ancestors);
        Ok(())
    }
}

/// One accepted-or-repeated draw of the MCMC chain.
#[derive(Debug, Clone)]
pub struct McmcRecord<T: RealField, const NP: usize> {
    /// Chain step index.
    pub step: usize,
    /// Parameter vector emitted at this step.
    pub params: ParamVector<T, NP>,
    /// Log-likelihood estimate attached to the emitted draw.
    pub log_likelihood: T,
    /// Log prior density of the emitted draw.
    pub log_prior: T,
    /// Whether this step's proposal was accepted.
    pub accepted: bool,
}

/// Receives per-step chain output.
pub trait McmcSink<T: RealField, const NP: usize> {
    /// Records one chain step. One record per step, rejected or not.
    fn record_draw(&mut self, record: &McmcRecord<T, NP>) -> Result<()>;
}

/// In-memory chain buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryMcmcBuffer<T: RealField, const NP: usize> {
    records: Vec<McmcRecord<T, NP>>,
}

impl<T: RealField + Copy, const NP: usize> MemoryMcmcBuffer<T, NP> {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Recorded chain steps in order.
    pub fn records(&self) -> &[McmcRecord<T, NP>] {
        &self.records
    }
}

impl<T: RealField + Copy, const NP: usize> McmcSink<T, NP> for MemoryMcmcBuffer<T, NP> {
    fn record_draw(&mut self, record: &McmcRecord<T, NP>) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// One smoothed marginal, emitted in time order.
#[derive(Debug, Clone)]
pub struct SmootherRecord<T: RealField, const ND: usize> {
    /// Observation time of this step.
    pub time: T,
    /// Smoothed marginal mean of the dynamic state.
    pub mean: DynVector<T, ND>,
    /// Smoothed marginal componentwise variance of the dynamic state.
    pub variance: DynVector<T, ND>,
    /// Normalized smoothed weights over the recorded particles.
    pub weights: Vec<T>,
}

/// Receives smoothed marginal trajectories.
pub trait SmootherSink<T: RealField, const ND: usize> {
    /// Records one smoothed step.
    fn record_step(&mut self, record: &SmootherRecord<T, ND>) -> Result<()>;
}

/// In-memory smoother buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySmootherBuffer<T: RealField, const ND: usize> {
    records: Vec<SmootherRecord<T, ND>>,
}

impl<T: RealField + Copy, const ND: usize> MemorySmootherBuffer<T, ND> {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Recorded smoothed steps in time order.
    pub fn records(&self) -> &[SmootherRecord<T, ND>] {
        &self.records
    }
}

impl<T: RealField + Copy, const ND: usize> SmootherSink<T, ND> for MemorySmootherBuffer<T, ND> {
    fn record_step(&mut self, record: &SmootherRecord<T, ND>) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

// ============================================================================
// JSON-Lines Persistence
// ============================================================================

#[derive(Serialize)]
struct ChainRow {
    step: usize,
    params: Vec<f64>,
    log_likelihood: f64,
    log_prior: f64,
    accepted: bool,
}

#[derive(Serialize)]
struct SmoothedRow {
    time: f64,
    mean: Vec<f64>,
    variance: Vec<f64>,
}

/// Streams chain or smoother records as JSON lines into any writer.
#[derive(Debug)]
pub struct JsonlWriter<W: Write> {
    out: W,
}

impl<W: Write> JsonlWriter<W> {
    /// Wraps a writer.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Unwraps the inner writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_row<S: Serialize>(&mut self, row: &S) -> Result<()> {
        serde_json::to_writer(&mut self.out, row).map_err(|e| SmcError::Io(e.to_string()))?;
        self.out
            .write_all(b"\n")
            .map_err(|e| SmcError::Io(e.to_string()))
    }
}

impl<W: Write, const NP: usize> McmcSink<f64, NP> for JsonlWriter<W> {
    fn record_draw(&mut self, record: &McmcRecord<f64, NP>) -> Result<()> {
        self.write_row(&ChainRow {
            step: record.step,
            params: record.params.as_slice().to_vec(),
            log_likelihood: record.log_likelihood,
            log_prior: record.log_prior,
            accepted: record.accepted,
        })
    }
}

impl<W: Write, const ND: usize> SmootherSink<f64, ND> for JsonlWriter<W> {
    fn record_step(&mut self, record: &SmootherRecord<f64, ND>) -> Result<()> {
        self.write_row(&SmoothedRow {
            time: record.time,
            mean: record.mean.as_slice().to_vec(),
            variance: record.variance.as_slice().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observations_validation() {
        let values = vec![ObsVector::from_array([1.0]); 2];
        assert!(MemoryObservations::new(vec![0.0, 1.0], values.clone()).is_ok());
        assert!(MemoryObservations::new(vec![1.0, 0.5], values.clone()).is_err());
        assert!(MemoryObservations::new(vec![0.0], values).is_err());
    }

    #[test]
    fn test_count_unique_times() {
        let values = vec![ObsVector::<f64, 1>::from_array([0.0]); 4];
        let obs = MemoryObservations::new(vec![1.0, 2.0, 3.0, 4.0], values).unwrap();
        assert_eq!(obs.count_unique_times(0.5), 0);
        assert_eq!(obs.count_unique_times(2.0), 2);
        assert_eq!(obs.count_unique_times(10.0), 4);
    }

    #[test]
    fn test_forcing_piecewise_lookup() {
        let forcing =
            MemoryForcing::new(vec![1.0, 3.0], vec![vec![0.5], vec![0.7]]).unwrap();
        assert!(forcing.at(0.0).is_none());
        assert_eq!(forcing.at(1.0).unwrap(), &[0.5]);
        assert_eq!(forcing.at(2.9).unwrap(), &[0.5]);
        assert_eq!(forcing.at(3.1).unwrap(), &[0.7]);
    }

    #[test]
    fn test_memory_init_broadcast() {
        let init = MemoryInit::<f64, 1, 0, 2> {
            dynamic: Some(DynVector::from_array([4.0])),
            collapsed: None,
            params: None,
        };
        assert!((init.dynamic(0).unwrap().index(0) - 4.0).abs() < 1e-12);
        assert!((init.dynamic(7).unwrap().index(0) - 4.0).abs() < 1e-12);
        assert!(init.params().is_none());
    }

    #[test]
    fn test_mcmc_buffer_records_in_order() {
        let mut buffer = MemoryMcmcBuffer::<f64, 2>::new();
        for step in 0..3 {
            buffer
                .record_draw(&McmcRecord {
                    step,
                    params: ParamVector::from_array([step as f64, 0.0]),
                    log_likelihood: -1.0,
                    log_prior: -2.0,
                    accepted: step % 2 == 0,
                })
                .unwrap();
        }
        assert_eq!(buffer.records().len(), 3);
        assert_eq!(buffer.records()[2].step, 2);
    }

    #[test]
    fn test_jsonl_chain_rows() {
        let mut writer = JsonlWriter::new(Vec::new());
        McmcSink::<f64, 2>::record_draw(
            &mut writer,
            &McmcRecord {
                step: 0,
                params: ParamVector::from_array([1.5, 2.5]),
                log_likelihood: -3.0,
                log_prior: -0.5,
                accepted: true,
            },
        )
        .unwrap();
        let bytes = writer.into_inner();
        let line = String::from_utf8(bytes).unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains("\"accepted\":true"));
        assert!(line.contains("1.5"));
    }

    #[test]
    fn test_jsonl_smoother_rows() {
        let mut writer = JsonlWriter::new(Vec::new());
        SmootherSink::<f64, 1>::record_step(
            &mut writer,
            &SmootherRecord {
                time: 2.0,
                mean: DynVector::from_array([0.25]),
                variance: DynVector::from_array([0.04]),
                weights: vec![1.0],
            },
        )
        .unwrap();
        let line = String::from_utf8(writer.into_inner()).unwrap();
        assert!(line.contains("\"time\":2.0"));
        assert!(line.contains("0.25"));
    }
}

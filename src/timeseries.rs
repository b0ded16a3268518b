//! Append-only, run-length compressed time series for one field.
//!
//! Only value transitions are stored: appending the value already held by the
//! most recent sample bumps the observation counter and nothing else, so no
//! two consecutive samples ever carry the same value.
//!
//! # Example
//!
//! ```
//! use fieldtap::codec::{Datatype, RawValue};
//! use fieldtap::timeseries::TimeSeriesLog;
//!
//! let mut log = TimeSeriesLog::create(16, RawValue::from_u64(0));
//! log.append(RawValue::from_u64(7), 1000, false, Datatype::Uint64)?;
//! log.append(RawValue::from_u64(7), 2000, false, Datatype::Uint64)?;
//! assert_eq!(log.len(), 1);
//! assert_eq!(log.total_observations(), 2);
//! # Ok::<(), fieldtap::Error>(())
//! ```

use serde::Serialize;

use crate::codec::{apply_diff, Datatype, RawValue};
use crate::{Error, Result};

/// One stored transition: the value first observed at `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub timestamp: u64,
    pub value: RawValue,
}

#[derive(Debug)]
pub struct TimeSeriesLog {
    samples: Vec<Sample>,
    total_observations: u64,
    baseline: RawValue,
}

impl TimeSeriesLog {
    /// Create a log whose diff baseline is `baseline`.
    ///
    /// `initial_capacity` is a hint. If it cannot be reserved the log falls
    /// back to room for a single sample, and failing that starts empty; it
    /// never fails the caller.
    pub fn create(initial_capacity: usize, baseline: RawValue) -> Self {
        let mut samples = Vec::new();
        if samples.try_reserve_exact(initial_capacity).is_err() {
            log::warn!("could not reserve {initial_capacity} samples, starting with one");
            let _ = samples.try_reserve_exact(1);
        }
        Self {
            samples,
            total_observations: 0,
            baseline,
        }
    }

    /// Record `value` observed at `timestamp`.
    ///
    /// With `diff` set the stored value is `value - baseline` in the
    /// arithmetic of `datatype`. Repeats of the last stored value are only
    /// counted.
    ///
    /// # Errors
    ///
    /// - `Error::Alloc`: backing storage could not grow, the log is unchanged
    pub fn append(
        &mut self,
        value: RawValue,
        timestamp: u64,
        diff: bool,
        datatype: Datatype,
    ) -> Result<()> {
        let to_store = apply_diff(value, self.baseline, datatype, diff);
        if self.samples.last().is_some_and(|last| last.value == to_store) {
            self.total_observations += 1;
            return Ok(());
        }
        self.grow_for_one()?;
        self.samples.push(Sample {
            timestamp,
            value: to_store,
        });
        self.total_observations += 1;
        Ok(())
    }

    fn grow_for_one(&mut self) -> Result<()> {
        if self.samples.len() < self.samples.capacity() {
            return Ok(());
        }
        let doubled = self.samples.capacity().max(2);
        if self.samples.try_reserve_exact(doubled).is_ok() {
            return Ok(());
        }
        self.samples
            .try_reserve_exact(2)
            .map_err(|_| Error::Alloc("time series sample storage"))
    }

    /// Copy out the stored samples in insertion order. The log is left as is;
    /// callers usually follow up with [`reset`](Self::reset).
    ///
    /// # Errors
    ///
    /// - `Error::Alloc`: the output vector could not be allocated
    pub fn drain(&self) -> Result<Vec<Sample>> {
        let mut out = Vec::new();
        out.try_reserve_exact(self.samples.len())
            .map_err(|_| Error::Alloc("drained samples"))?;
        out.extend_from_slice(&self.samples);
        Ok(out)
    }

    /// Forget all samples and observations, keeping the allocation.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.total_observations = 0;
    }

    /// Release backing storage. The log stays usable and regrows on append.
    pub fn destroy(&mut self) {
        self.samples = Vec::new();
        self.total_observations = 0;
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    /// Appends since the last reset, compressed repeats included.
    pub fn total_observations(&self) -> u64 {
        self.total_observations
    }

    pub fn baseline(&self) -> RawValue {
        self.baseline
    }
}

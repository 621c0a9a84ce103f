//! Candidate points and their chronological store.
//!
//! A [`Candidate`] is a single grid cell at a single time step that satisfied a track type's
//! detect criteria. The [`CandidateStore`] accumulates the per-step candidate sets across a run
//! in strictly increasing time order, which the stitcher relies on for correct linking.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::constants::{Candidates, Degree, StepIndex, MJD};
use crate::stormtrack_errors::StormTrackError;

/// A struct containing the location, time and criterion values of one detection
///
/// # Fields
///
/// * `time` - The timestamp of the detection (MJD)
/// * `seq` - Sequence number, unique within the time step (assigned in scan order)
/// * `i` - Column index of the grid cell (along longitude)
/// * `j` - Row index of the grid cell (along latitude)
/// * `lon` - Longitude of the cell in degrees
/// * `lat` - Latitude of the cell in degrees
/// * `value` - Value of the detect-criterion variable at the cell
/// * `extras` - Sampled values of the policy's record variables, in policy order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub time: MJD,
    pub seq: u32,
    pub i: usize,
    pub j: usize,
    pub lon: Degree,
    pub lat: Degree,
    pub value: f64,
    pub extras: SmallVec<[f64; 4]>,
}

impl Candidate {
    /// Create a new candidate point. Candidates are immutable after creation.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        time: MJD,
        seq: u32,
        i: usize,
        j: usize,
        lon: Degree,
        lat: Degree,
        value: f64,
        extras: SmallVec<[f64; 4]>,
    ) -> Self {
        Candidate {
            time,
            seq,
            i,
            j,
            lon,
            lat,
            value,
            extras,
        }
    }
}

/// One appended time step: its step index, timestamp and (possibly empty) candidate set.
#[derive(Debug, Clone, PartialEq)]
pub struct StepEntry {
    pub step: StepIndex,
    pub time: MJD,
    pub candidates: Candidates,
}

/// Ordered-by-time collection of candidate sets across all processed time steps.
///
/// Appends must be strictly increasing in step index and timestamp; a step's candidate set is
/// immutable once appended. A step that failed detection is simply absent, which the stitcher
/// counts toward its gap policy.
#[derive(Debug, Default, Clone)]
pub struct CandidateStore {
    steps: Vec<StepEntry>,
}

impl CandidateStore {
    pub fn new() -> Self {
        CandidateStore { steps: Vec::new() }
    }

    /// Append one time step's candidates.
    ///
    /// Arguments
    /// ---------
    /// * `step`: 1-based step index of the time step
    /// * `time`: timestamp of the time step (MJD)
    /// * `candidates`: the detected candidates, possibly empty
    ///
    /// Return
    /// ------
    /// * `Err(OutOfOrderTimeStep)` unless both `step` and `time` are strictly greater than the
    ///   previously appended ones
    pub fn append(
        &mut self,
        step: StepIndex,
        time: MJD,
        candidates: Candidates,
    ) -> Result<(), StormTrackError> {
        if let Some(last) = self.steps.last() {
            if step <= last.step || time <= last.time {
                return Err(StormTrackError::OutOfOrderTimeStep {
                    previous_step: last.step,
                    previous: last.time,
                    appended_step: step,
                    appended: time,
                });
            }
        }
        self.steps.push(StepEntry {
            step,
            time,
            candidates,
        });
        Ok(())
    }

    /// Lazy forward pass over the appended steps, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &StepEntry> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Total number of candidates across all steps.
    pub fn n_candidates(&self) -> usize {
        self.steps.iter().map(|s| s.candidates.len()).sum()
    }
}

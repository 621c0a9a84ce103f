use thiserror::Error;

use crate::constants::{StepIndex, MJD};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StormTrackError {
    #[error("Grid has no cells (empty latitude or longitude axis)")]
    EmptyGrid,

    #[error("Grid axis '{0}' is not strictly monotonic")]
    NonMonotonicAxis(String),

    #[error("Variable '{variable}' has {found} samples, grid has {expected} cells")]
    GridShapeMismatch {
        variable: String,
        expected: usize,
        found: usize,
    },

    #[error("Grid topology differs from the one the detector was built for")]
    GridTopologyMismatch,

    #[error("Missing variable '{variable}' in field grid at MJD {time}")]
    MissingVariable { variable: String, time: MJD },

    #[error("Invalid detect parameter: {0}")]
    InvalidDetectParameter(String),

    #[error("Invalid stitch parameter: {0}")]
    InvalidStitchParameter(String),

    #[error("Invalid track type policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error(
        "Out of order time step: appended step {appended_step} (MJD {appended}) \
         is not after step {previous_step} (MJD {previous})"
    )]
    OutOfOrderTimeStep {
        previous_step: StepIndex,
        previous: MJD,
        appended_step: StepIndex,
        appended: MJD,
    },

    #[error("Candidate store is empty, nothing to stitch")]
    EmptyCandidateStore,
}

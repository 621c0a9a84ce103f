//! # Pipeline driver
//!
//! Runs one track type's full detect + stitch pipeline over a chronological sequence of field
//! grids and produces its [`PipelineReport`].
//!
//! Detection is independent per time step: [`Pipeline::run_parallel`] spreads it over a scoped
//! worker pool, with completions flowing through a reorder buffer keyed by input position so
//! the candidate store is always appended in time order (the buffer never holds more entries
//! than there are workers). Stitching depends on the previous step's open trajectories and is
//! therefore always sequential. Independent track types share no mutable state and run fully
//! in parallel via [`run_track_types`].
//!
//! A detection error scoped to a single time step (a missing variable, a malformed grid) only
//! removes that step from the store — the stitcher sees it as a gap — and is reported in the
//! [`PipelineReport`] with the offending timestamp. Parameter-class errors are fatal.
//!
//! Cancellation is cooperative: a [`CancelToken`] is checked at the top of every per-step
//! iteration. Cancelling during stitching keeps the trajectories already finalized and
//! discards the open ones; cancelling during detection abandons the run before any trajectory
//! is finalized. Either way the report is flagged `cancelled`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::candidates::CandidateStore;
use crate::constants::{Candidates, StepIndex, MJD};
use crate::detect::CandidateDetector;
use crate::grid::FieldGrid;
use crate::policy::TrackTypePolicy;
use crate::stitch::{Trajectory, TrajectoryStitcher};
use crate::stormtrack_errors::StormTrackError;
use crate::time::step_of;

/// Cooperative cancellation flag, checked between per-step iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// A time step whose detection failed; the step is absent from the candidate store.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub step: StepIndex,
    pub time: MJD,
    pub error: StormTrackError,
}

/// Outcome of one track type's pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub track_type: String,
    pub trajectories: Vec<Trajectory>,
    pub failures: Vec<StepFailure>,
    pub cancelled: bool,
}

/// One track type's detect + stitch pipeline.
pub struct Pipeline {
    policy: TrackTypePolicy,
    time_period_hours: f64,
}

impl Pipeline {
    /// Create a pipeline for `policy` over data with the given output period.
    ///
    /// The policy is validated here; a malformed policy never starts a run.
    pub fn new(policy: TrackTypePolicy, time_period_hours: f64) -> Result<Self, StormTrackError> {
        policy.validate()?;
        if !(time_period_hours.is_finite() && time_period_hours > 0.0) {
            return Err(StormTrackError::InvalidPolicy(
                "time_period_hours must be finite and > 0".into(),
            ));
        }
        Ok(Pipeline {
            policy,
            time_period_hours,
        })
    }

    pub fn policy(&self) -> &TrackTypePolicy {
        &self.policy
    }

    /// Run the pipeline, detecting step by step in input order.
    ///
    /// `grids` must be in chronological order; the candidate store rejects anything else with
    /// [`StormTrackError::OutOfOrderTimeStep`].
    pub fn run(
        &self,
        grids: &[FieldGrid],
        cancel: &CancelToken,
    ) -> Result<PipelineReport, StormTrackError> {
        if grids.is_empty() {
            return Err(StormTrackError::EmptyCandidateStore);
        }
        let detector =
            CandidateDetector::new(grids[0].spec().clone(), self.policy.detect.clone())?;
        let first_time = grids[0].time();

        let mut store = CandidateStore::new();
        let mut failures = Vec::new();
        for grid in grids {
            if cancel.is_cancelled() {
                info!(track_type = %self.policy.name, "run cancelled during detection");
                return Ok(self.cancelled_report(failures));
            }
            let step = step_of(first_time, grid.time(), self.time_period_hours);
            self.detect_into_store(&detector, grid, step, &mut store, &mut failures)?;
        }

        self.stitch_phase(&store, failures, cancel)
    }

    /// Run the pipeline with detection spread over `workers` threads.
    ///
    /// Workers claim input positions from a shared counter and detect independently; the
    /// consumer releases completions in input order through a reorder buffer, so the result is
    /// identical to [`Pipeline::run`].
    pub fn run_parallel(
        &self,
        grids: &[FieldGrid],
        workers: usize,
        cancel: &CancelToken,
    ) -> Result<PipelineReport, StormTrackError> {
        if grids.is_empty() {
            return Err(StormTrackError::EmptyCandidateStore);
        }
        let detector =
            CandidateDetector::new(grids[0].spec().clone(), self.policy.detect.clone())?;
        let first_time = grids[0].time();
        let workers = workers.clamp(1, grids.len());

        let mut store = CandidateStore::new();
        let mut failures = Vec::new();
        let mut fatal: Option<StormTrackError> = None;

        let next = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel::<(usize, StepIndex, Result<Candidates, StormTrackError>)>();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                let stop = &stop;
                let detector = &detector;
                let period = self.time_period_hours;
                scope.spawn(move || loop {
                    if stop.load(Ordering::Relaxed) || cancel.is_cancelled() {
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    if index >= grids.len() {
                        break;
                    }
                    let grid = &grids[index];
                    let step = step_of(first_time, grid.time(), period);
                    if tx.send((index, step, detector.detect(grid))).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            // reorder buffer: completions arrive out of order, at most `workers` of them
            // pending, and are released strictly in input order
            let mut pending: BTreeMap<usize, (StepIndex, Result<Candidates, StormTrackError>)> =
                BTreeMap::new();
            let mut next_expected = 0usize;
            for (index, step, result) in rx {
                pending.insert(index, (step, result));
                while let Some((step, result)) = pending.remove(&next_expected) {
                    let grid = &grids[next_expected];
                    next_expected += 1;
                    let released = match result {
                        Ok(candidates) => store.append(step, grid.time(), candidates),
                        Err(error) if is_step_scoped(&error) => {
                            warn!(step, time = grid.time(), %error, "detection failed for step");
                            failures.push(StepFailure {
                                step,
                                time: grid.time(),
                                error,
                            });
                            Ok(())
                        }
                        Err(error) => Err(error),
                    };
                    if let Err(error) = released {
                        fatal = Some(error);
                        stop.store(true, Ordering::Relaxed);
                        break;
                    }
                }
                if fatal.is_some() {
                    break;
                }
            }
        });

        if let Some(error) = fatal {
            return Err(error);
        }
        if cancel.is_cancelled() {
            info!(track_type = %self.policy.name, "run cancelled during detection");
            return Ok(self.cancelled_report(failures));
        }
        self.stitch_phase(&store, failures, cancel)
    }

    /// Detect one step and append it, recording step-scoped failures instead of propagating.
    fn detect_into_store(
        &self,
        detector: &CandidateDetector,
        grid: &FieldGrid,
        step: StepIndex,
        store: &mut CandidateStore,
        failures: &mut Vec<StepFailure>,
    ) -> Result<(), StormTrackError> {
        match detector.detect(grid) {
            Ok(candidates) => {
                debug!(step, count = candidates.len(), "detected candidates");
                store.append(step, grid.time(), candidates)
            }
            Err(error) if is_step_scoped(&error) => {
                warn!(step, time = grid.time(), %error, "detection failed for step");
                failures.push(StepFailure {
                    step,
                    time: grid.time(),
                    error,
                });
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    /// Stitch the accumulated store, honoring cancellation between steps.
    fn stitch_phase(
        &self,
        store: &CandidateStore,
        failures: Vec<StepFailure>,
        cancel: &CancelToken,
    ) -> Result<PipelineReport, StormTrackError> {
        if store.is_empty() {
            return Err(StormTrackError::EmptyCandidateStore);
        }
        let mut stitcher = TrajectoryStitcher::new(&self.policy.stitch)?;
        for entry in store.iter() {
            if cancel.is_cancelled() {
                info!(track_type = %self.policy.name, "run cancelled during stitching");
                return Ok(PipelineReport {
                    track_type: self.policy.name.clone(),
                    trajectories: stitcher.abort(),
                    failures,
                    cancelled: true,
                });
            }
            stitcher.process_step(entry.step, &entry.candidates);
        }
        let trajectories = stitcher.finish();
        info!(
            track_type = %self.policy.name,
            steps = store.len(),
            candidates = store.n_candidates(),
            trajectories = trajectories.len(),
            "pipeline complete"
        );
        Ok(PipelineReport {
            track_type: self.policy.name.clone(),
            trajectories,
            failures,
            cancelled: false,
        })
    }

    fn cancelled_report(&self, failures: Vec<StepFailure>) -> PipelineReport {
        PipelineReport {
            track_type: self.policy.name.clone(),
            trajectories: Vec::new(),
            failures,
            cancelled: true,
        }
    }
}

/// True for errors that invalidate a single time step's detection without invalidating the
/// run. Parameter-class errors are never step-scoped.
fn is_step_scoped(error: &StormTrackError) -> bool {
    matches!(
        error,
        StormTrackError::MissingVariable { .. }
            | StormTrackError::GridShapeMismatch { .. }
            | StormTrackError::GridTopologyMismatch
    )
}

/// Run each track type's full pipeline in parallel over the same read-only grids.
///
/// Returns one result per policy, in policy order.
pub fn run_track_types(
    policies: &[TrackTypePolicy],
    grids: &[FieldGrid],
    time_period_hours: f64,
    cancel: &CancelToken,
) -> Vec<Result<PipelineReport, StormTrackError>> {
    policies
        .par_iter()
        .map(|policy| Pipeline::new(policy.clone(), time_period_hours)?.run(grids, cancel))
        .collect()
}

//! # Trajectory stitching
//!
//! The stitch stage consumes the time-ordered [`CandidateStore`] and links candidates across
//! time steps into trajectories, per a track type's [`StitchParams`].
//!
//! Each in-progress trajectory is a slot in an index-addressable arena carrying an explicit
//! `OPEN`/`CLOSED` tag and a consecutive-missing-steps counter. Per time step, in order:
//!
//! 1. every open trajectory proposes its nearest candidate within the maximum displacement,
//! 2. proposals are granted in ascending (displacement, trajectory id) order, each candidate
//!    claimed at most once — when two trajectories compete for the same candidate the one with
//!    the smaller displacement wins, and the loser is treated as unmatched for this step,
//! 3. unmatched trajectories age: their gap counter increments, and they close once it exceeds
//!    the allowed maximum,
//! 4. every unclaimed candidate starts a new open trajectory of length 1.
//!
//! Step indices missing from the store (a failed or skipped detection) are processed as
//! candidate-free steps, so they count toward the gap policy. Linking is strictly one-to-one;
//! no merges or splits. At stream end all open trajectories close, and a closed trajectory is
//! emitted only if it meets the minimum duration.

pub mod gap_fill;
pub mod overlap;
pub mod params;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::candidates::{Candidate, CandidateStore};
use crate::constants::{Candidates, Degree, StepIndex, TrackId, MJD};
use crate::grid::angular_separation_deg;
use crate::stormtrack_errors::StormTrackError;
use self::params::StitchParams;

/// How a trajectory point came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointOrigin {
    /// Linked from a detected candidate; carries the candidate's per-step sequence number.
    Detected { seq: u32 },
    /// Inserted by gap interpolation (see [`gap_fill`]).
    Interpolated,
}

/// One point of a trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub time: MJD,
    pub step: StepIndex,
    pub i: usize,
    pub j: usize,
    pub lon: Degree,
    pub lat: Degree,
    pub value: f64,
    pub extras: SmallVec<[f64; 4]>,
    pub origin: PointOrigin,
}

impl TrackPoint {
    pub fn from_candidate(step: StepIndex, candidate: &Candidate) -> Self {
        TrackPoint {
            time: candidate.time,
            step,
            i: candidate.i,
            j: candidate.j,
            lon: candidate.lon,
            lat: candidate.lat,
            value: candidate.value,
            extras: candidate.extras.clone(),
            origin: PointOrigin::Detected {
                seq: candidate.seq,
            },
        }
    }

    pub fn is_observed(&self) -> bool {
        matches!(self.origin, PointOrigin::Detected { .. })
    }
}

/// A finalized, retained trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub id: TrackId,
    pub points: Vec<TrackPoint>,
}

impl Trajectory {
    /// Number of observed (detected) points; gap-interpolated points do not count.
    pub fn duration_steps(&self) -> u32 {
        self.points.iter().filter(|p| p.is_observed()).count() as u32
    }

    /// Number of steps from the first to the last point, inclusive.
    pub fn span_steps(&self) -> u32 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => last.step - first.step + 1,
            _ => 0,
        }
    }

    pub fn start_time(&self) -> Option<MJD> {
        self.points.first().map(|p| p.time)
    }

    pub fn end_time(&self) -> Option<MJD> {
        self.points.last().map(|p| p.time)
    }

    /// Elapsed time between the first and last point, in days.
    pub fn elapsed_days(&self) -> f64 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => last.time - first.time,
            _ => 0.0,
        }
    }
}

/// Lifecycle tag of an arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackState {
    /// Eligible for extension; `gap` counts consecutive steps without a linked candidate.
    Open { gap: u32 },
    Closed,
}

/// One in-progress trajectory in the arena.
#[derive(Debug)]
struct TrackSlot {
    id: TrackId,
    state: TrackState,
    points: Vec<TrackPoint>,
}

/// Incremental stitcher; feed steps in chronological order, then finalize.
///
/// Driven either directly via [`TrajectoryStitcher::process_step`] (the pipeline does this so
/// it can check cancellation between steps) or in one go via [`stitch_candidates`].
pub struct TrajectoryStitcher<'a> {
    params: &'a StitchParams,
    slots: Vec<TrackSlot>,
    next_id: TrackId,
    retained: Vec<Trajectory>,
    last_step: Option<StepIndex>,
}

impl<'a> TrajectoryStitcher<'a> {
    /// Create a stitcher, validating the parameter set.
    pub fn new(params: &'a StitchParams) -> Result<Self, StormTrackError> {
        params.validate()?;
        Ok(TrajectoryStitcher {
            params,
            slots: Vec::new(),
            next_id: 0,
            retained: Vec::new(),
            last_step: None,
        })
    }

    /// Process one time step's candidate set.
    ///
    /// Step indices skipped since the previous call are processed first as candidate-free
    /// steps, so a time step absent from the store counts toward the gap policy.
    pub fn process_step(&mut self, step: StepIndex, candidates: &Candidates) {
        if let Some(last) = self.last_step {
            for _ in last + 1..step {
                self.advance_unmatched_all();
            }
        }
        self.match_step(step, candidates);
        self.last_step = Some(step);
    }

    /// Finalize: close every remaining open trajectory and return the retained set, ordered
    /// by trajectory id.
    pub fn finish(mut self) -> Vec<Trajectory> {
        for s in 0..self.slots.len() {
            if matches!(self.slots[s].state, TrackState::Open { .. }) {
                self.close(s);
            }
        }
        self.retained.sort_by_key(|t| t.id);
        self.retained
    }

    /// Abort on cancellation: discard in-progress open trajectories, keep what was already
    /// finalized.
    pub fn abort(mut self) -> Vec<Trajectory> {
        self.retained.sort_by_key(|t| t.id);
        self.retained
    }

    /// Number of currently open trajectories.
    pub fn n_open(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s.state, TrackState::Open { .. }))
            .count()
    }

    /// The per-step bipartite nearest-match pass.
    fn match_step(&mut self, step: StepIndex, candidates: &Candidates) {
        // 1. every open trajectory proposes its nearest candidate within range,
        //    ties on distance broken by lowest candidate sequence number
        let mut proposals: Vec<(Degree, usize, usize)> = Vec::new();
        for (s, slot) in self.slots.iter().enumerate() {
            if !matches!(slot.state, TrackState::Open { .. }) {
                continue;
            }
            // an open trajectory always has at least one point
            let Some(last) = slot.points.last() else {
                continue;
            };
            let mut best: Option<(Degree, usize)> = None;
            for (c, candidate) in candidates.iter().enumerate() {
                let displacement =
                    angular_separation_deg(last.lon, last.lat, candidate.lon, candidate.lat);
                if displacement <= self.params.max_displacement_deg
                    && best.map_or(true, |(bd, _)| displacement < bd)
                {
                    best = Some((displacement, c));
                }
            }
            if let Some((displacement, c)) = best {
                proposals.push((displacement, s, c));
            }
        }

        // 2. grant in (displacement, trajectory id) order; slot order equals id order
        proposals.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let mut claimed = vec![false; candidates.len()];
        let mut matched = vec![false; self.slots.len()];
        for (displacement, s, c) in proposals {
            if claimed[c] {
                // competing claim lost; treated as unmatched for this step
                continue;
            }
            claimed[c] = true;
            matched[s] = true;
            let slot = &mut self.slots[s];
            slot.points.push(TrackPoint::from_candidate(step, &candidates[c]));
            slot.state = TrackState::Open { gap: 0 };
            debug!(track = slot.id, step, displacement, "extended trajectory");
        }

        // 3. unmatched open trajectories age and may close
        for s in 0..self.slots.len() {
            if !matched[s] {
                self.advance_unmatched(s);
            }
        }

        // 4. unclaimed candidates each start a new open trajectory
        for (c, candidate) in candidates.iter().enumerate() {
            if claimed[c] {
                continue;
            }
            let id = self.next_id;
            self.next_id += 1;
            self.slots.push(TrackSlot {
                id,
                state: TrackState::Open { gap: 0 },
                points: vec![TrackPoint::from_candidate(step, candidate)],
            });
            debug!(track = id, step, "started trajectory");
        }
    }

    /// Age every open trajectory by one candidate-free step.
    fn advance_unmatched_all(&mut self) {
        for s in 0..self.slots.len() {
            self.advance_unmatched(s);
        }
    }

    /// Increment a slot's gap counter, closing it once the counter exceeds the allowed gap.
    fn advance_unmatched(&mut self, s: usize) {
        if let TrackState::Open { gap } = self.slots[s].state {
            let gap = gap + 1;
            if gap > self.params.max_gap_steps {
                self.close(s);
            } else {
                self.slots[s].state = TrackState::Open { gap };
            }
        }
    }

    /// Close a slot and retain or drop it against the minimum-duration policy.
    fn close(&mut self, s: usize) {
        let slot = &mut self.slots[s];
        slot.state = TrackState::Closed;
        let points = std::mem::take(&mut slot.points);
        if points.len() as u32 >= self.params.min_duration_steps {
            self.retained.push(Trajectory {
                id: slot.id,
                points,
            });
        } else {
            debug!(track = slot.id, length = points.len(), "dropped short trajectory");
        }
    }
}

/// Stitch a complete candidate store into its final trajectory set.
///
/// Arguments
/// ---------
/// * `store`: the time-ordered candidate store of the run
/// * `params`: the track type's stitch parameter set
///
/// Return
/// ------
/// * the retained trajectories ordered by id
///
/// Errors
/// ------
/// * [`StormTrackError::EmptyCandidateStore`] if no time steps were appended,
/// * [`StormTrackError::InvalidStitchParameter`] on a malformed parameter set
pub fn stitch_candidates(
    store: &CandidateStore,
    params: &StitchParams,
) -> Result<Vec<Trajectory>, StormTrackError> {
    if store.is_empty() {
        return Err(StormTrackError::EmptyCandidateStore);
    }
    let mut stitcher = TrajectoryStitcher::new(params)?;
    for entry in store.iter() {
        stitcher.process_step(entry.step, &entry.candidates);
    }
    Ok(stitcher.finish())
}

#[cfg(test)]
mod stitch_test {
    use super::*;
    use smallvec::smallvec;

    fn candidate(time: MJD, seq: u32, lon: Degree, lat: Degree) -> Candidate {
        Candidate::new(time, seq, 0, 0, lon, lat, 100_000.0, smallvec![])
    }

    fn params(max_disp: f64, max_gap: u32, min_dur: u32) -> StitchParams {
        StitchParams::builder()
            .max_displacement_deg(max_disp)
            .max_gap_steps(max_gap)
            .min_duration_steps(min_dur)
            .build()
            .unwrap()
    }

    #[test]
    fn test_single_chain_links() {
        let p = params(3.0, 0, 1);
        let mut stitcher = TrajectoryStitcher::new(&p).unwrap();
        for step in 1..=4u32 {
            let lon = step as f64 * 2.0;
            stitcher.process_step(step, &smallvec![candidate(59215.0 + step as f64, 0, lon, 10.0)]);
        }
        let tracks = stitcher.finish();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].points.len(), 4);
        assert_eq!(tracks[0].duration_steps(), 4);
        assert_eq!(tracks[0].id, 0);
    }

    #[test]
    fn test_competing_claim_smaller_displacement_wins() {
        let p = params(5.0, 0, 1);
        let mut stitcher = TrajectoryStitcher::new(&p).unwrap();
        // two trajectories, then a single candidate nearer to the second
        stitcher.process_step(
            1,
            &smallvec![candidate(59215.0, 0, 10.0, 0.0), candidate(59215.0, 1, 14.0, 0.0)],
        );
        stitcher.process_step(2, &smallvec![candidate(59216.0, 0, 13.0, 0.0)]);
        let tracks = stitcher.finish();

        // track 1 (born at lon 14) claimed the candidate at lon 13; track 0 closed at length 1
        let winner = tracks.iter().find(|t| t.points.len() == 2).unwrap();
        assert_eq!(winner.points[0].lon, 14.0);
        let loser = tracks.iter().find(|t| t.points.len() == 1).unwrap();
        assert_eq!(loser.points[0].lon, 10.0);
    }

    #[test]
    fn test_gap_counter_resets_on_match() {
        let p = params(3.0, 1, 1);
        let mut stitcher = TrajectoryStitcher::new(&p).unwrap();
        stitcher.process_step(1, &smallvec![candidate(59215.0, 0, 10.0, 0.0)]);
        stitcher.process_step(2, &smallvec![]); // gap 1, still open
        stitcher.process_step(3, &smallvec![candidate(59217.0, 0, 11.0, 0.0)]); // reset
        stitcher.process_step(4, &smallvec![]); // gap 1 again, still open
        stitcher.process_step(5, &smallvec![candidate(59219.0, 0, 12.0, 0.0)]);
        let tracks = stitcher.finish();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].duration_steps(), 3);
        assert_eq!(tracks[0].span_steps(), 5);
    }

    #[test]
    fn test_skipped_store_steps_count_as_gaps() {
        let p = params(3.0, 0, 1);
        let mut stitcher = TrajectoryStitcher::new(&p).unwrap();
        stitcher.process_step(1, &smallvec![candidate(59215.0, 0, 10.0, 0.0)]);
        // step 2 absent from the store entirely; max gap 0 closes the trajectory
        stitcher.process_step(3, &smallvec![candidate(59217.0, 0, 10.5, 0.0)]);
        let tracks = stitcher.finish();
        assert_eq!(tracks.len(), 2);
    }

    #[test]
    fn test_empty_store_is_an_error() {
        let store = CandidateStore::new();
        let err = stitch_candidates(&store, &params(3.0, 0, 1)).unwrap_err();
        assert_eq!(err, StormTrackError::EmptyCandidateStore);
    }

    #[test]
    fn test_abort_discards_open_trajectories() {
        let p = params(3.0, 5, 1);
        let mut stitcher = TrajectoryStitcher::new(&p).unwrap();
        stitcher.process_step(1, &smallvec![candidate(59215.0, 0, 10.0, 0.0)]);
        assert_eq!(stitcher.n_open(), 1);
        assert!(stitcher.abort().is_empty());
    }
}

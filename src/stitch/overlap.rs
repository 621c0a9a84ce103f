//! Cross-run trajectory reconciliation.
//!
//! A long simulation is tracked in consecutive periods, and a storm alive at a period boundary
//! appears in both the earlier and the later run's output: as the full storm, as a truncated
//! head, or as a duplicate. This module classifies such overlaps and produces a reconciled
//! trajectory list with the duplicates removed and truncated later trajectories extended
//! backwards from the earlier run.
//!
//! Two trajectories overlap when they share at least one timestamp and their positions at the
//! first shared timestamp agree within a distance threshold. Expect at most one spatial match
//! per trajectory.

use itertools::iproduct;
use tracing::debug;

use crate::constants::{Degree, TrackId, MJD};
use crate::grid::wrap_lon_delta;
use crate::stitch::Trajectory;

/// How an earlier-run trajectory relates to a later-run trajectory it overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapMethod {
    /// Same storm, fully covered by the later trajectory: drop the earlier one.
    Remove,
    /// The earlier run holds the storm's start: extend the later trajectory backwards.
    Extend,
    /// Same start but the earlier trajectory is longer: keep the later one as is.
    ExtendOdd,
}

/// A classified overlap between one earlier-run and one later-run trajectory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackOverlap {
    /// Index of the earlier trajectory within its run's list.
    pub early: usize,
    /// Index of the first shared timestamp within the later trajectory.
    pub time_late: usize,
    /// Index of the first shared timestamp within the earlier trajectory.
    pub time_early: usize,
    /// `time_early - time_late`: how many points the earlier run holds before the later
    /// trajectory starts.
    pub offset: isize,
    pub method: OverlapMethod,
}

fn same_time(a: MJD, b: MJD) -> bool {
    (a - b).abs() < 1e-9
}

/// Indices of the trajectories in `pool` sharing at least one timestamp with `trajectory`.
pub fn overlapping_in_time(trajectory: &Trajectory, pool: &[Trajectory]) -> Vec<usize> {
    pool.iter()
        .enumerate()
        .filter(|(_, other)| {
            trajectory.points.iter().any(|p| {
                other.points.iter().any(|q| same_time(p.time, q.time))
            })
        })
        .map(|(index, _)| index)
        .collect()
}

/// Find the spatial overlap of a later-run trajectory among time-overlapping earlier-run
/// trajectories, and classify it. Returns the first match, if any.
///
/// Arguments
/// ---------
/// * `late`: a trajectory from the later run
/// * `early_pool`: the earlier run's trajectories
/// * `early_indices`: the time-overlapping subset of `early_pool` to consider
/// * `threshold_deg`: maximum latitude/longitude offset (degrees) at the first shared
///   timestamp for the trajectories to be the same storm
pub fn classify_overlap(
    late: &Trajectory,
    early_pool: &[Trajectory],
    early_indices: &[usize],
    threshold_deg: Degree,
) -> Option<TrackOverlap> {
    for &early_index in early_indices {
        let early = &early_pool[early_index];

        let shared: Vec<(usize, usize)> = iproduct!(
            late.points.iter().enumerate(),
            early.points.iter().enumerate()
        )
        .filter(|((_, p), (_, q))| same_time(p.time, q.time))
        .map(|((li, _), (ei, _))| (li, ei))
        .collect();
        let Some(&(time_late, time_early)) = shared.first() else {
            continue;
        };

        let p = &late.points[time_late];
        let q = &early.points[time_early];
        let dist_lat = (p.lat - q.lat).abs();
        let dist_lon = wrap_lon_delta(q.lon, p.lon).abs();
        if dist_lat >= threshold_deg || dist_lon >= threshold_deg {
            continue;
        }

        let n_shared = shared.len();
        let method = if late.points.len() == early.points.len() && early.points.len() == n_shared {
            // exactly the same storm
            OverlapMethod::Remove
        } else if time_late == time_early {
            // same start time in both runs; keep whichever is longer
            if late.points.len() >= early.points.len() {
                OverlapMethod::Remove
            } else {
                OverlapMethod::ExtendOdd
            }
        } else if time_early > time_late {
            // the earlier run holds the start of the storm
            OverlapMethod::Extend
        } else {
            OverlapMethod::Remove
        };

        let overlap = TrackOverlap {
            early: early_index,
            time_late,
            time_early,
            offset: time_early as isize - time_late as isize,
            method,
        };
        debug!(?overlap.method, overlap.offset, "classified cross-run overlap");
        return Some(overlap);
    }
    None
}

/// Reconcile two consecutive runs' trajectory lists.
///
/// Earlier trajectories matched by a later one are dropped; a later trajectory whose overlap
/// classifies as [`OverlapMethod::Extend`] is extended backwards with the earlier points that
/// precede the first shared timestamp. Unmatched trajectories from both runs are kept.
/// Trajectory ids are reassigned sequentially over the reconciled list (earlier survivors
/// first, then the later run).
pub fn reconcile_runs(
    early: &[Trajectory],
    late: &[Trajectory],
    threshold_deg: Degree,
) -> Vec<Trajectory> {
    let mut early_matched = vec![false; early.len()];
    let mut reconciled_late: Vec<Trajectory> = Vec::with_capacity(late.len());

    for trajectory in late {
        let available: Vec<usize> = overlapping_in_time(trajectory, early)
            .into_iter()
            .filter(|&e| !early_matched[e])
            .collect();
        match classify_overlap(trajectory, early, &available, threshold_deg) {
            Some(overlap) => {
                early_matched[overlap.early] = true;
                let mut merged = trajectory.clone();
                if overlap.method == OverlapMethod::Extend {
                    let head = &early[overlap.early].points[..overlap.offset as usize];
                    let mut points = head.to_vec();
                    points.append(&mut merged.points);
                    merged.points = points;
                }
                reconciled_late.push(merged);
            }
            None => reconciled_late.push(trajectory.clone()),
        }
    }

    let mut out: Vec<Trajectory> = early
        .iter()
        .zip(&early_matched)
        .filter(|(_, &matched)| !matched)
        .map(|(t, _)| t.clone())
        .chain(reconciled_late)
        .collect();
    for (index, trajectory) in out.iter_mut().enumerate() {
        trajectory.id = index as TrackId;
    }
    out
}

#[cfg(test)]
mod overlap_test {
    use super::*;
    use crate::stitch::{PointOrigin, TrackPoint};
    use smallvec::smallvec;

    fn point(step: u32, time: MJD, lon: f64, lat: f64) -> TrackPoint {
        TrackPoint {
            time,
            step,
            i: 0,
            j: 0,
            lon,
            lat,
            value: 99_000.0,
            extras: smallvec![],
            origin: PointOrigin::Detected { seq: 0 },
        }
    }

    fn track(id: TrackId, start_step: u32, start_time: MJD, lons: &[f64]) -> Trajectory {
        Trajectory {
            id,
            points: lons
                .iter()
                .enumerate()
                .map(|(k, &lon)| {
                    point(start_step + k as u32, start_time + k as f64 * 0.25, lon, 10.0)
                })
                .collect(),
        }
    }

    #[test]
    fn test_duplicate_storm_is_removed() {
        let early = vec![track(0, 1, 59215.0, &[10.0, 12.0, 14.0])];
        let late = vec![track(0, 1, 59215.0, &[10.0, 12.0, 14.0])];
        let merged = reconcile_runs(&early, &late, 0.5);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].points.len(), 3);
    }

    #[test]
    fn test_truncated_storm_is_extended_backwards() {
        // the earlier run saw the storm from its birth, the later run only its tail
        let early = vec![track(0, 1, 59215.0, &[10.0, 12.0, 14.0, 16.0])];
        let late = vec![track(0, 3, 59215.5, &[14.0, 16.0, 18.0, 20.0])];
        let merged = reconcile_runs(&early, &late, 0.5);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].points.len(), 6);
        assert_eq!(merged[0].points[0].lon, 10.0);
        assert_eq!(merged[0].points[5].lon, 20.0);
    }

    #[test]
    fn test_distinct_storms_are_kept() {
        // same times but 40 degrees apart
        let early = vec![track(0, 1, 59215.0, &[10.0, 12.0])];
        let late = vec![track(0, 1, 59215.0, &[50.0, 52.0])];
        let merged = reconcile_runs(&early, &late, 0.5);
        assert_eq!(merged.len(), 2);
        // ids are reassigned sequentially
        assert_eq!(merged[0].id, 0);
        assert_eq!(merged[1].id, 1);
    }

    #[test]
    fn test_no_time_overlap_is_no_match() {
        let early = vec![track(0, 1, 59215.0, &[10.0, 12.0])];
        let late = vec![track(0, 10, 59217.5, &[10.0, 12.0])];
        assert!(overlapping_in_time(&late[0], &early).is_empty());
        assert_eq!(reconcile_runs(&early, &late, 0.5).len(), 2);
    }

    #[test]
    fn test_same_start_longer_early_keeps_late() {
        let early = vec![track(0, 1, 59215.0, &[10.0, 12.0, 14.0, 16.0])];
        let late = vec![track(0, 1, 59215.0, &[10.0, 12.0])];
        let overlap = classify_overlap(
            &late[0],
            &early,
            &overlapping_in_time(&late[0], &early),
            0.5,
        )
        .unwrap();
        assert_eq!(overlap.method, OverlapMethod::ExtendOdd);
        let merged = reconcile_runs(&early, &late, 0.5);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].points.len(), 2);
    }
}

//! Gap interpolation for stitched trajectories.
//!
//! A trajectory may span steps where no candidate was linked (within the allowed gap). For
//! downstream consumers that want one point per step, [`fill_gaps`] inserts linearly
//! interpolated points into those gaps: longitude interpolation wraps across the 0/360
//! discontinuity and the output longitudes stay in `[0, 360)`; grid column indices wrap the
//! same way. Interpolated points are tagged [`PointOrigin::Interpolated`] and never count
//! toward a trajectory's observed duration.

use crate::constants::{HOURS_PER_DAY, LON_WRAP_DEG};
use crate::grid::{normalize_lon, wrap_lon_delta, GridSpec};
use crate::stitch::{PointOrigin, TrackPoint, Trajectory};

/// Fill every internal gap of `trajectory` by linear interpolation.
///
/// Arguments
/// ---------
/// * `trajectory`: the stitched trajectory, one point per linked step
/// * `spec`: the run's grid topology (for the column-index wrap length)
/// * `time_period_hours`: the period in hours between time points in the data
///
/// Return
/// ------
/// * a trajectory with the same id and observed points, plus one interpolated point per
///   missing step
pub fn fill_gaps(trajectory: &Trajectory, spec: &GridSpec, time_period_hours: f64) -> Trajectory {
    let mut points: Vec<TrackPoint> = Vec::with_capacity(trajectory.points.len());
    let n_lon = spec.n_lon() as f64;
    let period_days = time_period_hours / HOURS_PER_DAY;

    for point in &trajectory.points {
        if let Some(prev) = points.last() {
            let gap_length = point.step - prev.step;
            if gap_length > 1 {
                let steps = gap_length as f64;
                let dlon = wrap_lon_delta(prev.lon, point.lon) / steps;
                let dlat = (point.lat - prev.lat) / steps;
                let mut di_total = point.i as f64 - prev.i as f64;
                if spec.is_global_lon() {
                    // shortest way around the row, like the longitude itself
                    di_total = (di_total + n_lon / 2.0).rem_euclid(n_lon) - n_lon / 2.0;
                }
                let di = di_total / steps;
                let dj = (point.j as f64 - prev.j as f64) / steps;
                let dvalue = (point.value - prev.value) / steps;
                let dextras: Vec<f64> = point
                    .extras
                    .iter()
                    .zip(&prev.extras)
                    .map(|(next, prev)| (next - prev) / steps)
                    .collect();

                let base = prev.clone();
                for k in 1..gap_length {
                    let f = k as f64;
                    points.push(TrackPoint {
                        time: base.time + f * period_days,
                        step: base.step + k,
                        i: (base.i as f64 + f * di).rem_euclid(n_lon) as usize,
                        j: (base.j as f64 + f * dj).round() as usize,
                        lon: normalize_lon(base.lon + f * dlon),
                        lat: base.lat + f * dlat,
                        value: base.value + f * dvalue,
                        extras: base
                            .extras
                            .iter()
                            .zip(&dextras)
                            .map(|(v, dv)| v + f * dv)
                            .collect(),
                        origin: PointOrigin::Interpolated,
                    });
                }
            }
        }
        points.push(point.clone());
    }

    Trajectory {
        id: trajectory.id,
        points,
    }
}

/// True iff `lon` lies in the `[0, 360)` output convention.
pub fn lon_in_output_range(lon: f64) -> bool {
    (0.0..LON_WRAP_DEG).contains(&lon)
}

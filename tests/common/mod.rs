#![allow(dead_code)]

use std::sync::Arc;

use smallvec::smallvec;

use stormtrack::candidates::{Candidate, CandidateStore};
use stormtrack::constants::{Candidates, MJD};
use stormtrack::grid::{angular_separation_deg, FieldGrid, GridSpec};

/// MJD of the first time point used by the test runs (2021-01-01T00:00:00).
pub const T0: MJD = 59215.0;

/// Output period of the test runs, in hours.
pub const PERIOD_HOURS: f64 = 6.0;

/// Global 2°-spaced grid, 90 × 180 cells.
pub fn spec_2deg() -> Arc<GridSpec> {
    let lats: Vec<f64> = (0..90).map(|j| -89.0 + 2.0 * j as f64).collect();
    let lons: Vec<f64> = (0..180).map(|i| 2.0 * i as f64).collect();
    Arc::new(GridSpec::new(lats, lons, true).unwrap())
}

/// Nominal MJD of 1-based step `step`.
pub fn time_of_step(step: u32) -> MJD {
    T0 + (step as f64 - 1.0) * PERIOD_HOURS / 24.0
}

/// Uniform 101 kPa pressure field with radially decaying lows of the given depths imposed.
pub fn pressure_field(spec: &GridSpec, lows: &[(usize, usize, f64)]) -> Vec<f64> {
    let mut values = vec![101_000.0; spec.n_cells()];
    for &(ci, cj, depth) in lows {
        let (clon, clat) = (spec.lon(ci), spec.lat(cj));
        for flat in 0..spec.n_cells() {
            let (i, j) = spec.cell_of(flat);
            let d = angular_separation_deg(clon, clat, spec.lon(i), spec.lat(j));
            if d < 12.0 {
                values[flat] -= depth * (1.0 - d / 12.0);
            }
        }
    }
    values
}

/// One time step's grid with a `psl` field holding the given lows.
pub fn pressure_grid(spec: &Arc<GridSpec>, step: u32, lows: &[(usize, usize, f64)]) -> FieldGrid {
    FieldGrid::new(spec.clone(), time_of_step(step))
        .with_variable("psl", pressure_field(spec, lows), Some("Pa".into()))
        .unwrap()
}

/// A run of `n_steps` grids with one deep low starting at `(i0, j)` and moving `di` columns
/// east per step.
pub fn moving_low_run(spec: &Arc<GridSpec>, n_steps: u32, i0: usize, j: usize, di: usize) -> Vec<FieldGrid> {
    (1..=n_steps)
        .map(|step| {
            let i = i0 + (step as usize - 1) * di;
            pressure_grid(spec, step, &[(i, j, 600.0)])
        })
        .collect()
}

/// Candidate at the given position, for store-level stitcher tests.
pub fn candidate_at(time: MJD, seq: u32, lon: f64, lat: f64) -> Candidate {
    Candidate::new(time, seq, 0, 0, lon, lat, 100_000.0, smallvec![])
}

/// Build a store from `(step, positions)` pairs; times follow the nominal 6-hourly grid and
/// sequence numbers follow position order.
pub fn store_from(steps: &[(u32, &[(f64, f64)])]) -> CandidateStore {
    let mut store = CandidateStore::new();
    for &(step, positions) in steps {
        let time = time_of_step(step);
        let candidates: Candidates = positions
            .iter()
            .enumerate()
            .map(|(seq, &(lon, lat))| candidate_at(time, seq as u32, lon, lat))
            .collect();
        store.append(step, time, candidates).unwrap();
    }
    store
}

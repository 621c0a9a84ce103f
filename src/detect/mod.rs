//! # Candidate detection
//!
//! The detect stage scans one time step's [`FieldGrid`] for grid cells satisfying a track
//! type's detect criteria and produces that step's [`Candidate`] set.
//!
//! Detection is purely functional over its inputs: the same grid and parameters always yield
//! the same candidates, in the same order, with the same sequence numbers. Cells are scanned in
//! ascending flat-index order; extremum ties within a neighbourhood are broken by grid index
//! (lowest wins for minima, highest for maxima), so exactly one cell of a tied plateau
//! qualifies.
//!
//! A [`CandidateDetector`] precomputes the neighbourhood reach tables for its parameter set
//! once and is then reused for every time step of the run (and shared between detection
//! workers; it is immutable).

pub mod params;

use std::collections::VecDeque;
use std::sync::Arc;

use itertools::izip;
use smallvec::SmallVec;

use crate::candidates::Candidate;
use crate::constants::Candidates;
use crate::grid::neighbors::NeighborTable;
use crate::grid::{FieldGrid, GridSpec, GridVariable};
use crate::stormtrack_errors::StormTrackError;
use self::params::{ClosedContour, DetectParams, ExtremumKind};

/// Reusable detector for one track type over one grid topology.
pub struct CandidateDetector {
    params: DetectParams,
    spec: Arc<GridSpec>,
    search: NeighborTable,
    /// Reach tables of the threshold criteria; `None` where the radius is zero (cell-local).
    threshold_tables: Vec<Option<NeighborTable>>,
}

impl CandidateDetector {
    /// Build a detector for `params` over `spec`.
    ///
    /// Validates the parameter set and precomputes the neighbourhood tables. Fails with
    /// [`StormTrackError::InvalidDetectParameter`] on a malformed parameter set.
    pub fn new(spec: Arc<GridSpec>, params: DetectParams) -> Result<Self, StormTrackError> {
        params.validate()?;
        let search = NeighborTable::new(spec.clone(), params.search_radius_deg);
        let threshold_tables = params
            .thresholds
            .iter()
            .map(|criterion| {
                (criterion.radius_deg > 0.0)
                    .then(|| NeighborTable::new(spec.clone(), criterion.radius_deg))
            })
            .collect();
        Ok(CandidateDetector {
            params,
            spec,
            search,
            threshold_tables,
        })
    }

    pub fn params(&self) -> &DetectParams {
        &self.params
    }

    /// Detect the candidate set of one time step.
    ///
    /// Arguments
    /// ---------
    /// * `grid`: the time step's field grid; must share the topology the detector was built for
    ///
    /// Return
    /// ------
    /// * the candidates in ascending flat-index order, sequence numbers assigned in that order
    ///
    /// Errors
    /// ------
    /// * [`StormTrackError::GridTopologyMismatch`] if the grid's topology differs,
    /// * [`StormTrackError::MissingVariable`] if a criterion or record variable is absent,
    /// * [`StormTrackError::InvalidDetectParameter`] on a declared units mismatch.
    pub fn detect(&self, grid: &FieldGrid) -> Result<Candidates, StormTrackError> {
        if !Arc::ptr_eq(grid.spec(), &self.spec) && **grid.spec() != *self.spec {
            return Err(StormTrackError::GridTopologyMismatch);
        }

        let primary = grid.require(&self.params.variable)?;
        check_units(&self.params.variable, &self.params.units, primary)?;

        let thresholds: Vec<&GridVariable> = self
            .params
            .thresholds
            .iter()
            .map(|criterion| {
                let var = grid.require(&criterion.variable)?;
                check_units(&criterion.variable, &criterion.units, var)?;
                Ok(var)
            })
            .collect::<Result<_, StormTrackError>>()?;

        let record: Vec<&GridVariable> = self
            .params
            .record
            .iter()
            .map(|name| grid.require(name))
            .collect::<Result<_, StormTrackError>>()?;

        let values = &primary.values;
        let mut visited = vec![false; self.spec.n_cells()];
        let mut candidates = Candidates::new();

        for flat in 0..self.spec.n_cells() {
            let center = values[flat];
            if !center.is_finite() {
                continue;
            }
            if !self.is_extremum(flat, center, values) {
                continue;
            }
            if let Some(contour) = &self.params.contour {
                if !self.contour_is_closed(flat, center, values, contour, &mut visited) {
                    continue;
                }
            }
            if !self.thresholds_hold(flat, &thresholds) {
                continue;
            }

            let (i, j) = self.spec.cell_of(flat);
            let extras: SmallVec<[f64; 4]> = record.iter().map(|var| var.values[flat]).collect();
            candidates.push(Candidate::new(
                grid.time(),
                candidates.len() as u32,
                i,
                j,
                self.spec.lon(i),
                self.spec.lat(j),
                center,
                extras,
            ));
        }

        Ok(candidates)
    }

    /// True iff `flat` is the extremum of its search neighbourhood, ties broken by grid index.
    /// Non-finite neighbours are treated as missing data.
    fn is_extremum(&self, flat: usize, center: f64, values: &[f64]) -> bool {
        self.search.visit_while(flat, |neighbor| {
            let sample = values[neighbor];
            if !sample.is_finite() {
                return true;
            }
            match self.params.extremum {
                ExtremumKind::Minimum => {
                    sample > center || (sample == center && neighbor > flat)
                }
                ExtremumKind::Maximum => {
                    sample < center || (sample == center && neighbor < flat)
                }
            }
        })
    }

    /// Region-growing closed-contour test.
    ///
    /// Grows from the candidate over edge-adjacent cells whose value has not yet departed from
    /// the centre by `contour.delta` (risen, for a minimum). The contour is closed iff the grown
    /// region never escapes `contour.radius_deg` of the centre. A non-finite cell inside the
    /// region counts as an escape.
    fn contour_is_closed(
        &self,
        center_flat: usize,
        center: f64,
        values: &[f64],
        contour: &ClosedContour,
        visited: &mut [bool],
    ) -> bool {
        let inside = |sample: f64| match self.params.extremum {
            ExtremumKind::Minimum => sample < center + contour.delta,
            ExtremumKind::Maximum => sample > center - contour.delta,
        };

        let mut touched = vec![center_flat];
        let mut queue = VecDeque::from([center_flat]);
        visited[center_flat] = true;
        let mut closed = true;

        'grow: while let Some(flat) = queue.pop_front() {
            for neighbor in self.spec.edge_neighbors(flat) {
                if visited[neighbor] {
                    continue;
                }
                visited[neighbor] = true;
                touched.push(neighbor);

                let sample = values[neighbor];
                if !sample.is_finite() {
                    closed = false;
                    break 'grow;
                }
                if !inside(sample) {
                    continue;
                }
                if self.spec.separation_deg(center_flat, neighbor) > contour.radius_deg {
                    closed = false;
                    break 'grow;
                }
                queue.push_back(neighbor);
            }
        }

        for flat in touched {
            visited[flat] = false;
        }
        closed
    }

    /// A cell qualifies only if every threshold criterion is satisfied by at least one cell
    /// within its radius (the cell itself for a zero radius).
    fn thresholds_hold(&self, flat: usize, thresholds: &[&GridVariable]) -> bool {
        izip!(&self.params.thresholds, thresholds, &self.threshold_tables).all(
            |(criterion, var, table)| {
                let sample = var.values[flat];
                if sample.is_finite() && criterion.op.eval(sample, criterion.value) {
                    return true;
                }
                match table {
                    None => false,
                    Some(table) => !table.visit_while(flat, |neighbor| {
                        let sample = var.values[neighbor];
                        !(sample.is_finite() && criterion.op.eval(sample, criterion.value))
                    }),
                }
            })
    }
}

/// One-shot detection over a single grid. Builds a throwaway [`CandidateDetector`]; prefer
/// keeping a detector around when processing a whole run.
pub fn detect_candidates(
    grid: &FieldGrid,
    params: &DetectParams,
) -> Result<Candidates, StormTrackError> {
    CandidateDetector::new(grid.spec().clone(), params.clone())?.detect(grid)
}

fn check_units(
    variable: &str,
    expected: &Option<String>,
    var: &GridVariable,
) -> Result<(), StormTrackError> {
    if let (Some(expected), Some(found)) = (expected, &var.units) {
        if expected != found {
            return Err(StormTrackError::InvalidDetectParameter(format!(
                "variable '{variable}' has units '{found}', criterion expects '{expected}'"
            )));
        }
    }
    Ok(())
}

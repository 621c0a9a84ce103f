//! # Field grids
//!
//! In-memory representation of one time step's gridded meteorological variables on a fixed
//! latitude/longitude mesh.
//!
//! The grid topology ([`GridSpec`]) is built once per run and shared (via [`Arc`]) by every
//! [`FieldGrid`] of that run. A `FieldGrid` couples the topology with a timestamp and a set of
//! named variable arrays, one sample per grid cell, and is read-only after construction.
//!
//! Cells are addressed either by `(i, j)` axis indices (`i` along longitude, `j` along latitude)
//! or by the flat index `j * n_lon + i`. Distances between cells are great-circle angular
//! separations in degrees, with longitude wraparound handled for global grids.

pub mod neighbors;

use std::sync::Arc;

use crate::constants::{Degree, VariableMap, LON_WRAP_DEG, MJD, RADEG};
use crate::stormtrack_errors::StormTrackError;
use smallvec::SmallVec;

/// Fixed spatial mesh of a run: latitude and longitude axes plus wraparound topology.
///
/// Axes must be strictly increasing. Once constructed the topology is immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    lats: Vec<Degree>,
    lons: Vec<Degree>,
    global_lon: bool,
}

impl GridSpec {
    /// Build a grid topology from its axes.
    ///
    /// Arguments
    /// ---------
    /// * `lats`: latitude axis in degrees, strictly increasing
    /// * `lons`: longitude axis in degrees, strictly increasing
    /// * `global_lon`: true if the longitude axis spans the full circle, so that
    ///   neighbourhoods wrap across the 0/360 discontinuity
    ///
    /// Return
    /// ------
    /// * the topology, or an error if an axis is empty or not strictly monotonic
    pub fn new(
        lats: Vec<Degree>,
        lons: Vec<Degree>,
        global_lon: bool,
    ) -> Result<Self, StormTrackError> {
        if lats.is_empty() || lons.is_empty() {
            return Err(StormTrackError::EmptyGrid);
        }
        if !lats.windows(2).all(|w| w[0] < w[1]) {
            return Err(StormTrackError::NonMonotonicAxis("latitude".into()));
        }
        if !lons.windows(2).all(|w| w[0] < w[1]) {
            return Err(StormTrackError::NonMonotonicAxis("longitude".into()));
        }
        Ok(GridSpec {
            lats,
            lons,
            global_lon,
        })
    }

    pub fn n_lat(&self) -> usize {
        self.lats.len()
    }

    pub fn n_lon(&self) -> usize {
        self.lons.len()
    }

    /// Total number of grid cells.
    pub fn n_cells(&self) -> usize {
        self.lats.len() * self.lons.len()
    }

    pub fn is_global_lon(&self) -> bool {
        self.global_lon
    }

    /// Latitude of row `j` in degrees.
    pub fn lat(&self, j: usize) -> Degree {
        self.lats[j]
    }

    /// Longitude of column `i` in degrees.
    pub fn lon(&self, i: usize) -> Degree {
        self.lons[i]
    }

    /// Flat index of cell `(i, j)`.
    #[inline]
    pub fn flat(&self, i: usize, j: usize) -> usize {
        j * self.lons.len() + i
    }

    /// Axis indices `(i, j)` of a flat cell index.
    #[inline]
    pub fn cell_of(&self, flat: usize) -> (usize, usize) {
        (flat % self.lons.len(), flat / self.lons.len())
    }

    /// Great-circle angular separation between two cells, in degrees.
    pub fn separation_deg(&self, a: usize, b: usize) -> Degree {
        let (ia, ja) = self.cell_of(a);
        let (ib, jb) = self.cell_of(b);
        angular_separation_deg(self.lons[ia], self.lats[ja], self.lons[ib], self.lats[jb])
    }

    /// Cells sharing an edge with `flat`: west/east along the row (wrapping on global grids)
    /// and south/north along the column (clamped at the poles).
    pub fn edge_neighbors(&self, flat: usize) -> SmallVec<[usize; 4]> {
        let n_lon = self.lons.len();
        let (i, j) = self.cell_of(flat);
        let mut out = SmallVec::new();
        if i > 0 {
            out.push(self.flat(i - 1, j));
        } else if self.global_lon && n_lon > 1 {
            out.push(self.flat(n_lon - 1, j));
        }
        if i + 1 < n_lon {
            out.push(self.flat(i + 1, j));
        } else if self.global_lon && n_lon > 1 {
            out.push(self.flat(0, j));
        }
        if j > 0 {
            out.push(self.flat(i, j - 1));
        }
        if j + 1 < self.lats.len() {
            out.push(self.flat(i, j + 1));
        }
        out
    }
}

/// Great-circle angular separation between two points in degrees, via the haversine formula.
pub fn angular_separation_deg(
    lon1: Degree,
    lat1: Degree,
    lon2: Degree,
    lat2: Degree,
) -> Degree {
    let phi1 = lat1 * RADEG;
    let phi2 = lat2 * RADEG;
    let dphi = (lat2 - lat1) * RADEG;
    let dlambda = (lon2 - lon1) * RADEG;
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * a.sqrt().clamp(0.0, 1.0).asin() / RADEG
}

/// Shortest signed longitude difference `to - from` in degrees, in `[-180, 180)`.
pub fn wrap_lon_delta(from: Degree, to: Degree) -> Degree {
    ((to - from) + 180.0).rem_euclid(LON_WRAP_DEG) - 180.0
}

/// Normalize a longitude to `[0, 360)` degrees.
pub fn normalize_lon(lon: Degree) -> Degree {
    lon.rem_euclid(LON_WRAP_DEG)
}

/// One named variable of a field grid: dense samples plus optional units metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct GridVariable {
    pub values: Vec<f64>,
    pub units: Option<String>,
}

/// One time step's gridded variables on a shared topology.
///
/// Constructed once per time step from external input, read-only thereafter.
#[derive(Debug, Clone)]
pub struct FieldGrid {
    spec: Arc<GridSpec>,
    time: MJD,
    variables: VariableMap,
}

impl FieldGrid {
    /// Create an empty field grid for one time step.
    pub fn new(spec: Arc<GridSpec>, time: MJD) -> Self {
        FieldGrid {
            spec,
            time,
            variables: VariableMap::default(),
        }
    }

    /// Attach a variable array to the grid.
    ///
    /// Fails with [`StormTrackError::GridShapeMismatch`] unless the array holds exactly one
    /// value per grid cell.
    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
        units: Option<String>,
    ) -> Result<(), StormTrackError> {
        let name = name.into();
        if values.len() != self.spec.n_cells() {
            return Err(StormTrackError::GridShapeMismatch {
                variable: name,
                expected: self.spec.n_cells(),
                found: values.len(),
            });
        }
        self.variables.insert(name, GridVariable { values, units });
        Ok(())
    }

    /// Builder-style variant of [`FieldGrid::add_variable`].
    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        values: Vec<f64>,
        units: Option<String>,
    ) -> Result<Self, StormTrackError> {
        self.add_variable(name, values, units)?;
        Ok(self)
    }

    pub fn spec(&self) -> &Arc<GridSpec> {
        &self.spec
    }

    pub fn time(&self) -> MJD {
        self.time
    }

    pub fn variable(&self, name: &str) -> Option<&GridVariable> {
        self.variables.get(name)
    }

    /// Look up a variable, failing with [`StormTrackError::MissingVariable`] (carrying this
    /// grid's timestamp) if absent.
    pub fn require(&self, name: &str) -> Result<&GridVariable, StormTrackError> {
        self.variables
            .get(name)
            .ok_or_else(|| StormTrackError::MissingVariable {
                variable: name.to_string(),
                time: self.time,
            })
    }
}

#[cfg(test)]
mod grid_test {
    use super::*;
    use approx::assert_relative_eq;

    fn spec_2deg_global() -> GridSpec {
        let lats: Vec<f64> = (0..90).map(|j| -89.0 + 2.0 * j as f64).collect();
        let lons: Vec<f64> = (0..180).map(|i| 2.0 * i as f64).collect();
        GridSpec::new(lats, lons, true).unwrap()
    }

    #[test]
    fn test_axis_validation() {
        assert_eq!(
            GridSpec::new(vec![], vec![0.0], true).unwrap_err(),
            StormTrackError::EmptyGrid
        );
        assert!(matches!(
            GridSpec::new(vec![10.0, 0.0], vec![0.0, 1.0], false).unwrap_err(),
            StormTrackError::NonMonotonicAxis(_)
        ));
    }

    #[test]
    fn test_flat_indexing_roundtrip() {
        let spec = spec_2deg_global();
        for &(i, j) in &[(0, 0), (179, 0), (0, 89), (57, 33)] {
            assert_eq!(spec.cell_of(spec.flat(i, j)), (i, j));
        }
        assert_eq!(spec.n_cells(), 90 * 180);
    }

    #[test]
    fn test_separation_wraps_longitude() {
        // 2 degrees apart across the 0/360 seam at the equator
        let d = angular_separation_deg(359.0, 0.0, 1.0, 0.0);
        assert_relative_eq!(d, 2.0, epsilon = 1e-9);

        // one longitude step shrinks with latitude
        let d_eq = angular_separation_deg(0.0, 0.0, 2.0, 0.0);
        let d_60 = angular_separation_deg(0.0, 60.0, 2.0, 60.0);
        assert!(d_60 < d_eq / 1.9);
    }

    #[test]
    fn test_wrap_lon_delta() {
        assert_relative_eq!(wrap_lon_delta(359.0, 1.0), 2.0);
        assert_relative_eq!(wrap_lon_delta(1.0, 359.0), -2.0);
        assert_relative_eq!(wrap_lon_delta(10.0, 30.0), 20.0);
    }

    #[test]
    fn test_edge_neighbors_wrap() {
        let spec = spec_2deg_global();
        let corner = spec.flat(0, 0);
        let n = spec.edge_neighbors(corner);
        // wraps west to i = 179, no southern neighbour at the pole edge
        assert!(n.contains(&spec.flat(179, 0)));
        assert!(n.contains(&spec.flat(1, 0)));
        assert!(n.contains(&spec.flat(0, 1)));
        assert_eq!(n.len(), 3);

        let lats = vec![0.0, 2.0];
        let lons = vec![0.0, 2.0, 4.0];
        let regional = GridSpec::new(lats, lons, false).unwrap();
        let n = regional.edge_neighbors(regional.flat(0, 0));
        assert_eq!(n.len(), 2);
    }

    #[test]
    fn test_field_grid_variables() {
        let spec = Arc::new(GridSpec::new(vec![0.0, 2.0], vec![0.0, 2.0], false).unwrap());
        let mut grid = FieldGrid::new(spec.clone(), 59215.0);
        grid.add_variable("psl", vec![1.0; 4], Some("Pa".into()))
            .unwrap();

        assert!(grid.variable("psl").is_some());
        assert_eq!(
            grid.require("sfcWind").unwrap_err(),
            StormTrackError::MissingVariable {
                variable: "sfcWind".into(),
                time: 59215.0
            }
        );

        let err = grid
            .add_variable("sfcWind", vec![0.0; 3], None)
            .unwrap_err();
        assert!(matches!(err, StormTrackError::GridShapeMismatch { .. }));
    }
}

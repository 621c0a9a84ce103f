//! Precomputed neighbourhood offsets for radius queries over a grid.
//!
//! Local-extremum detection compares every cell against all cells within a search radius.
//! Doing that with a per-cell haversine scan over the whole grid is quadratic; instead a
//! [`NeighborTable`] precomputes, per latitude row, how many columns a given angular radius can
//! reach, so a radius query only visits a bounding band of rows and the exact separation check
//! runs on that band alone. The table is built once per run and reused for every time step.

use std::sync::Arc;

use crate::constants::{Degree, RADEG};
use crate::grid::GridSpec;

/// Per-row reach table for a fixed angular search radius over a fixed grid topology.
#[derive(Debug, Clone)]
pub struct NeighborTable {
    spec: Arc<GridSpec>,
    radius_deg: Degree,
    /// Maximum row offset the radius can span.
    j_reach: usize,
    /// Maximum column offset the radius can span, per target row.
    i_reach: Vec<usize>,
}

impl NeighborTable {
    /// Build the reach table for `radius_deg` over `spec`.
    ///
    /// The row reach comes from the smallest latitude spacing. The per-row column reach uses
    /// the bounding-box extent of a radius-`R` disc at that row's latitude,
    /// `asin(sin R / cos lat)`; once `cos lat <= sin R` the disc can wrap the pole and the
    /// whole row is scanned. Both are upper bounds; [`NeighborTable::visit`] still applies the
    /// exact great-circle check.
    pub fn new(spec: Arc<GridSpec>, radius_deg: Degree) -> Self {
        let min_dlat = axis_min_spacing(&(0..spec.n_lat()).map(|j| spec.lat(j)).collect::<Vec<_>>());
        let min_dlon = axis_min_spacing(&(0..spec.n_lon()).map(|i| spec.lon(i)).collect::<Vec<_>>());

        let j_reach = if spec.n_lat() == 1 {
            0
        } else {
            ((radius_deg / min_dlat).ceil() as usize).min(spec.n_lat() - 1)
        };

        let sin_r = (radius_deg.min(90.0) * RADEG).sin();
        let i_reach = (0..spec.n_lat())
            .map(|j| {
                if spec.n_lon() == 1 {
                    return 0;
                }
                let full_row = spec.n_lon() - 1;
                if radius_deg >= 90.0 {
                    return full_row;
                }
                let cos_lat = (spec.lat(j) * RADEG).cos();
                if cos_lat <= sin_r {
                    return full_row;
                }
                let dlon_max = (sin_r / cos_lat).asin() / RADEG;
                // one extra cell absorbs the discrete offset of the row's cells
                let needed = (dlon_max / min_dlon).ceil() as usize + 1;
                needed.min(full_row)
            })
            .collect();

        NeighborTable {
            spec,
            radius_deg,
            j_reach,
            i_reach,
        }
    }

    pub fn radius_deg(&self) -> Degree {
        self.radius_deg
    }

    pub fn spec(&self) -> &Arc<GridSpec> {
        &self.spec
    }

    /// Visit every cell within `radius_deg` of `center` (excluding the center itself), in a
    /// fixed order: rows ascending, columns ascending within each row.
    pub fn visit<F: FnMut(usize)>(&self, center: usize, mut f: F) {
        self.visit_while(center, |flat| {
            f(flat);
            true
        });
    }

    /// Like [`NeighborTable::visit`], but stops as soon as `f` returns `false`.
    ///
    /// Returns `true` iff `f` returned `true` for every visited cell.
    pub fn visit_while<F: FnMut(usize) -> bool>(&self, center: usize, mut f: F) -> bool {
        let spec = &self.spec;
        let n_lon = spec.n_lon();
        let (ci, cj) = spec.cell_of(center);
        let clon = spec.lon(ci);
        let clat = spec.lat(cj);

        let j_lo = cj.saturating_sub(self.j_reach);
        let j_hi = (cj + self.j_reach).min(spec.n_lat() - 1);

        for j in j_lo..=j_hi {
            let reach = self.i_reach[j];
            // the whole row fits inside the reach band
            if 2 * reach + 1 >= n_lon {
                for i in 0..n_lon {
                    let flat = spec.flat(i, j);
                    if flat == center {
                        continue;
                    }
                    if crate::grid::angular_separation_deg(clon, clat, spec.lon(i), spec.lat(j))
                        <= self.radius_deg
                        && !f(flat)
                    {
                        return false;
                    }
                }
                continue;
            }
            for di in -(reach as isize)..=(reach as isize) {
                let i = if spec.is_global_lon() {
                    (ci as isize + di).rem_euclid(n_lon as isize) as usize
                } else {
                    let i = ci as isize + di;
                    if i < 0 || i >= n_lon as isize {
                        continue;
                    }
                    i as usize
                };
                let flat = spec.flat(i, j);
                if flat == center {
                    continue;
                }
                if crate::grid::angular_separation_deg(clon, clat, spec.lon(i), spec.lat(j))
                    <= self.radius_deg
                    && !f(flat)
                {
                    return false;
                }
            }
        }
        true
    }

    /// Collect the cells within the radius of `center`, in visit order.
    pub fn neighbors_of(&self, center: usize) -> Vec<usize> {
        let mut out = Vec::new();
        self.visit(center, |flat| out.push(flat));
        out
    }
}

fn axis_min_spacing(axis: &[Degree]) -> Degree {
    axis.windows(2)
        .map(|w| w[1] - w[0])
        .fold(f64::INFINITY, f64::min)
}

//! # Detect stage parameters
//!
//! This module defines the [`DetectParams`] configuration struct and its builder, which control
//! how the candidate detector selects grid cells: which variable is scanned, what kind of
//! extremum is looked for, how wide the search neighbourhood is, and which additional
//! closed-contour and threshold criteria a cell must satisfy.
//!
//! ## Purpose
//!
//! A [`DetectParams`] object centralizes the tunable parameters of one track type's detect
//! stage, resolved from that track type's `[<track_type>_detect]` configuration section by the
//! hosting workflow (parsing is out of scope here). It allows you to:
//!
//! - Select the scanned variable and the extremum kind (minimum or maximum),
//! - Bound the local-extremum neighbourhood with a search radius in degrees,
//! - Require a closed contour of a given magnitude around each accepted cell,
//! - Intersect additional threshold criteria on other variables,
//! - Name record variables to sample at each accepted cell.
//!
//! ## Example
//!
//! ```rust
//! use stormtrack::detect::params::{DetectParams, ExtremumKind, ThresholdOp};
//!
//! let params = DetectParams::builder("psl")
//!     .extremum(ExtremumKind::Minimum)
//!     .search_radius_deg(6.0)
//!     .contour(200.0, 5.5)
//!     .threshold("sfcWind", ThresholdOp::GreaterEqual, 10.0, 4.0)
//!     .record("sfcWind")
//!     .build()
//!     .unwrap();
//! assert_eq!(params.variable, "psl");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::Degree;
use crate::stormtrack_errors::StormTrackError;

/// Which kind of local extremum the detector scans for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtremumKind {
    /// Local minimum (e.g. sea-level pressure lows).
    Minimum,
    /// Local maximum (e.g. vorticity maxima).
    Maximum,
}

/// Comparison operator of a threshold criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOp {
    GreaterEqual,
    LessEqual,
}

impl ThresholdOp {
    #[inline]
    pub fn eval(&self, sample: f64, value: f64) -> bool {
        match self {
            ThresholdOp::GreaterEqual => sample >= value,
            ThresholdOp::LessEqual => sample <= value,
        }
    }
}

/// Closed-contour criterion: the scanned variable must change by at least `delta` in every
/// direction within `radius_deg` of an accepted cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedContour {
    /// Required contour magnitude, in the scanned variable's units.
    pub delta: f64,
    /// Radius within which the contour must close, in degrees.
    pub radius_deg: Degree,
}

/// One auxiliary threshold criterion on a named variable.
///
/// A cell qualifies if at least one cell within `radius_deg` of it (the cell itself for a zero
/// radius) satisfies the comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCriterion {
    pub variable: String,
    pub op: ThresholdOp,
    pub value: f64,
    #[serde(default)]
    pub radius_deg: Degree,
    /// Expected units of `variable`; checked against the grid's declared units when both are
    /// present.
    #[serde(default)]
    pub units: Option<String>,
}

/// Configuration parameters controlling one track type's candidate detection.
///
/// Built via [`DetectParams::builder`], which validates the configuration, or deserialized from
/// the resolved configuration values (in which case [`DetectParams::validate`] runs before the
/// pipeline starts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectParams {
    /// Name of the scanned variable (e.g. `"psl"`).
    pub variable: String,
    /// Expected units of the scanned variable; checked against the grid's declared units when
    /// both are present.
    #[serde(default)]
    pub units: Option<String>,
    /// Extremum kind scanned for.
    pub extremum: ExtremumKind,
    /// Radius of the local-extremum neighbourhood, in degrees.
    pub search_radius_deg: Degree,
    /// Optional closed-contour criterion.
    #[serde(default)]
    pub contour: Option<ClosedContour>,
    /// Auxiliary threshold criteria; a cell must satisfy every one of them.
    #[serde(default)]
    pub thresholds: Vec<ThresholdCriterion>,
    /// Variables sampled at each accepted cell and carried into the candidate's extras.
    #[serde(default)]
    pub record: Vec<String>,
}

impl DetectParams {
    /// Create a new [`DetectParamsBuilder`] scanning `variable`.
    pub fn builder(variable: impl Into<String>) -> DetectParamsBuilder {
        DetectParamsBuilder::new(variable)
    }

    /// Check the parameter set for consistency.
    ///
    /// Validation rules
    /// -----------------
    /// * the scanned variable name must not be empty,
    /// * `search_radius_deg` must be finite and strictly positive,
    /// * a configured contour needs `delta > 0` and a finite `radius_deg > 0`,
    /// * every threshold criterion needs a non-empty variable name, a finite value and a
    ///   finite, non-negative radius,
    /// * record variable names must not be empty.
    pub fn validate(&self) -> Result<(), StormTrackError> {
        if self.variable.is_empty() {
            return Err(StormTrackError::InvalidDetectParameter(
                "detect variable name must not be empty".into(),
            ));
        }
        if !(self.search_radius_deg.is_finite() && self.search_radius_deg > 0.0) {
            return Err(StormTrackError::InvalidDetectParameter(
                "search_radius_deg must be finite and > 0".into(),
            ));
        }
        if let Some(contour) = &self.contour {
            if !(contour.delta.is_finite() && contour.delta > 0.0) {
                return Err(StormTrackError::InvalidDetectParameter(
                    "contour delta must be finite and > 0".into(),
                ));
            }
            if !(contour.radius_deg.is_finite() && contour.radius_deg > 0.0) {
                return Err(StormTrackError::InvalidDetectParameter(
                    "contour radius_deg must be finite and > 0".into(),
                ));
            }
        }
        for criterion in &self.thresholds {
            if criterion.variable.is_empty() {
                return Err(StormTrackError::InvalidDetectParameter(
                    "threshold variable name must not be empty".into(),
                ));
            }
            if !criterion.value.is_finite() {
                return Err(StormTrackError::InvalidDetectParameter(format!(
                    "threshold value for '{}' must be finite",
                    criterion.variable
                )));
            }
            if !(criterion.radius_deg.is_finite() && criterion.radius_deg >= 0.0) {
                return Err(StormTrackError::InvalidDetectParameter(format!(
                    "threshold radius_deg for '{}' must be finite and >= 0",
                    criterion.variable
                )));
            }
        }
        if self.record.iter().any(|name| name.is_empty()) {
            return Err(StormTrackError::InvalidDetectParameter(
                "record variable names must not be empty".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for DetectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.extremum {
            ExtremumKind::Minimum => "min",
            ExtremumKind::Maximum => "max",
        };
        write!(
            f,
            "DetectParams({kind} of '{}' within {:.2}°, contour={}, thresholds={}, record={})",
            self.variable,
            self.search_radius_deg,
            self.contour
                .as_ref()
                .map(|c| format!("{:.3}@{:.2}°", c.delta, c.radius_deg))
                .unwrap_or_else(|| "none".into()),
            self.thresholds.len(),
            self.record.len(),
        )
    }
}

/// Builder for [`DetectParams`], with validation.
#[derive(Debug, Clone)]
pub struct DetectParamsBuilder {
    params: DetectParams,
}

impl DetectParamsBuilder {
    /// Create a builder scanning `variable` for minima within a 6° neighbourhood.
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            params: DetectParams {
                variable: variable.into(),
                units: None,
                extremum: ExtremumKind::Minimum,
                search_radius_deg: 6.0,
                contour: None,
                thresholds: Vec::new(),
                record: Vec::new(),
            },
        }
    }

    pub fn units(mut self, units: impl Into<String>) -> Self {
        self.params.units = Some(units.into());
        self
    }

    pub fn extremum(mut self, kind: ExtremumKind) -> Self {
        self.params.extremum = kind;
        self
    }

    pub fn search_radius_deg(mut self, radius: Degree) -> Self {
        self.params.search_radius_deg = radius;
        self
    }

    pub fn contour(mut self, delta: f64, radius_deg: Degree) -> Self {
        self.params.contour = Some(ClosedContour { delta, radius_deg });
        self
    }

    pub fn threshold(
        mut self,
        variable: impl Into<String>,
        op: ThresholdOp,
        value: f64,
        radius_deg: Degree,
    ) -> Self {
        self.params.thresholds.push(ThresholdCriterion {
            variable: variable.into(),
            op,
            value,
            radius_deg,
            units: None,
        });
        self
    }

    pub fn record(mut self, variable: impl Into<String>) -> Self {
        self.params.record.push(variable.into());
        self
    }

    /// Finalize the builder, validating the parameter set.
    pub fn build(self) -> Result<DetectParams, StormTrackError> {
        self.params.validate()?;
        Ok(self.params)
    }
}

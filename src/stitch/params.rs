//! # Stitch stage parameters
//!
//! This module defines the [`StitchParams`] configuration struct and its builder, which control
//! how per-step candidates are linked into trajectories: how far a feature may move between
//! consecutive steps, how many consecutive steps it may go undetected, and how long a
//! trajectory must be to be kept.
//!
//! A [`StitchParams`] object holds one track type's stitch stage configuration, resolved from
//! that track type's `[<track_type>_stitch]` section by the hosting workflow.
//!
//! ## Example
//!
//! ```rust
//! use stormtrack::stitch::params::StitchParams;
//!
//! let params = StitchParams::builder()
//!     .max_displacement_deg(8.0)
//!     .max_gap_steps(1)
//!     .min_duration_steps(10)
//!     .build()
//!     .unwrap();
//! assert_eq!(params.max_gap_steps, 1);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::Degree;
use crate::stormtrack_errors::StormTrackError;

/// Configuration parameters controlling one track type's trajectory stitching.
///
/// Fields
/// -----------------
/// * `max_displacement_deg` – maximum great-circle displacement (degrees) a trajectory may make
///   between consecutive linked points.
/// * `max_gap_steps` – maximum number of consecutive time steps a trajectory may go without a
///   linked candidate before it is closed. Zero closes a trajectory on its first missed step.
/// * `min_duration_steps` – minimum number of linked points a closed trajectory needs to be
///   emitted; shorter trajectories are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StitchParams {
    pub max_displacement_deg: Degree,
    #[serde(default)]
    pub max_gap_steps: u32,
    pub min_duration_steps: u32,
}

impl StitchParams {
    /// Construct a new [`StitchParams`] with sensible default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new [`StitchParamsBuilder`] to configure custom parameters.
    pub fn builder() -> StitchParamsBuilder {
        StitchParamsBuilder::new()
    }

    /// Check the parameter set for consistency.
    ///
    /// Validation rules
    /// -----------------
    /// * `max_displacement_deg` must be finite and strictly positive,
    /// * `min_duration_steps` must be at least 1.
    ///
    /// `max_gap_steps` is unconstrained; zero is a valid (and common) setting.
    pub fn validate(&self) -> Result<(), StormTrackError> {
        if !(self.max_displacement_deg.is_finite() && self.max_displacement_deg > 0.0) {
            return Err(StormTrackError::InvalidStitchParameter(
                "max_displacement_deg must be finite and > 0".into(),
            ));
        }
        if self.min_duration_steps < 1 {
            return Err(StormTrackError::InvalidStitchParameter(
                "min_duration_steps must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for StitchParams {
    fn default() -> Self {
        StitchParams {
            max_displacement_deg: 8.0,
            max_gap_steps: 0,
            min_duration_steps: 1,
        }
    }
}

impl fmt::Display for StitchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StitchParams(displacement≤{:.2}°, gap≤{}, duration≥{})",
            self.max_displacement_deg, self.max_gap_steps, self.min_duration_steps
        )
    }
}

/// Builder for [`StitchParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct StitchParamsBuilder {
    params: StitchParams,
}

impl StitchParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: StitchParams::default(),
        }
    }

    pub fn max_displacement_deg(mut self, v: Degree) -> Self {
        self.params.max_displacement_deg = v;
        self
    }

    pub fn max_gap_steps(mut self, v: u32) -> Self {
        self.params.max_gap_steps = v;
        self
    }

    pub fn min_duration_steps(mut self, v: u32) -> Self {
        self.params.min_duration_steps = v;
        self
    }

    /// Finalize the builder and produce a [`StitchParams`] instance.
    pub fn build(self) -> Result<StitchParams, StormTrackError> {
        self.params.validate()?;
        Ok(self.params)
    }
}

#[cfg(test)]
mod stitch_params_test {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        StitchParams::default().validate().unwrap();
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        assert!(matches!(
            StitchParams::builder().max_displacement_deg(0.0).build(),
            Err(StormTrackError::InvalidStitchParameter(_))
        ));
        assert!(StitchParams::builder()
            .max_displacement_deg(f64::NAN)
            .build()
            .is_err());
        assert!(StitchParams::builder().min_duration_steps(0).build().is_err());
        // zero gap is valid
        assert!(StitchParams::builder().max_gap_steps(0).build().is_ok());
    }

    #[test]
    fn test_deserialized_params_validate() {
        let json = r#"{"max_displacement_deg": 8.0, "min_duration_steps": 10}"#;
        let params: StitchParams = serde_json::from_str(json).unwrap();
        params.validate().unwrap();
        assert_eq!(params.max_gap_steps, 0);
    }
}

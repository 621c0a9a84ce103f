//! # Track type policies
//!
//! A [`TrackTypePolicy`] is the named bundle of detect and stitch parameters for one track
//! type (e.g. tropical storms), resolved by the hosting workflow from the configuration file's
//! `[<track_type>_detect]` and `[<track_type>_stitch]` sections. Parsing those sections is out
//! of scope here; this crate consumes the resolved structured values, typically through the
//! serde `Deserialize` impl.
//!
//! New track types are configuration additions, not code changes: nothing in the detect or
//! stitch stages branches on the track type name.
//!
//! ## Example
//!
//! ```rust
//! use stormtrack::policy::TrackTypePolicy;
//!
//! let resolved = serde_json::json!({
//!     "name": "tc",
//!     "detect": {
//!         "variable": "psl",
//!         "extremum": "minimum",
//!         "search_radius_deg": 6.0,
//!         "contour": {"delta": 200.0, "radius_deg": 5.5},
//!         "record": ["sfcWind"]
//!     },
//!     "stitch": {
//!         "max_displacement_deg": 8.0,
//!         "max_gap_steps": 1,
//!         "min_duration_steps": 10
//!     }
//! });
//! let policy: TrackTypePolicy = serde_json::from_value(resolved).unwrap();
//! policy.validate().unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::detect::params::DetectParams;
use crate::stitch::params::StitchParams;
use crate::stormtrack_errors::StormTrackError;

/// Named, immutable bundle of one track type's detect and stitch parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackTypePolicy {
    /// Track type name, e.g. `"tc"` or `"etc"`.
    pub name: String,
    pub detect: DetectParams,
    pub stitch: StitchParams,
}

impl TrackTypePolicy {
    pub fn new(name: impl Into<String>, detect: DetectParams, stitch: StitchParams) -> Self {
        TrackTypePolicy {
            name: name.into(),
            detect,
            stitch,
        }
    }

    /// Validate the whole policy. Run before the pipeline starts; a malformed policy is fatal.
    pub fn validate(&self) -> Result<(), StormTrackError> {
        if self.name.is_empty() {
            return Err(StormTrackError::InvalidPolicy(
                "track type name must not be empty".into(),
            ));
        }
        self.detect.validate()?;
        self.stitch.validate()?;
        Ok(())
    }
}

impl fmt::Display for TrackTypePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} / {}", self.name, self.detect, self.stitch)
    }
}

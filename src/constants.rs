//! # Constants and type definitions for stormtrack
//!
//! This module centralizes the **physical constants**, **conversion factors**, and **common type
//! definitions** used throughout the `stormtrack` library. It also defines the container types
//! used to organize per-step candidate sets and gridded variables.
//!
//! ## Overview
//!
//! - Geophysical constants and unit conversions
//! - Core type aliases used across the crate
//! - Identifiers for time steps and trajectories
//! - Container types for candidates and grid variables
//!
//! These definitions are used by all main modules, including candidate detection, stitching,
//! and the pipeline driver.

use crate::candidates::Candidate;
use crate::grid::GridVariable;
use smallvec::SmallVec;
use std::collections::HashMap;

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// 2π, useful for trigonometric conversions
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// Number of seconds in a day
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Number of seconds in an hour
pub const SECONDS_PER_HOUR: f64 = 3_600.0;

/// Number of hours in a day
pub const HOURS_PER_DAY: f64 = 24.0;

/// Mean Earth radius in kilometers (IUGG)
pub const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Numerical epsilon used for floating-point comparisons
pub const EPS: f64 = 1e-6;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Full turn of longitude in degrees
pub const LON_WRAP_DEG: f64 = 360.0;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Distance in kilometers
pub type Kilometer = f64;
/// Modified Julian Date (days)
pub type MJD = f64;

/// 1-based time step number within a run, counted from the first time point
pub type StepIndex = u32;

/// Identifier of an emitted trajectory, unique within a run
pub type TrackId = u32;

// -------------------------------------------------------------------------------------------------
// Data containers
// -------------------------------------------------------------------------------------------------

/// A small, inline-optimized container for the candidates of a single time step.
pub type Candidates = SmallVec<[Candidate; 4]>;

/// Lookup table from variable name to its gridded samples for one time step.
pub type VariableMap = HashMap<String, GridVariable, ahash::RandomState>;
